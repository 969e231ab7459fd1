//! Recovery storage for interpreter process state.
//!
//! Implementations are looked up by name in a [`RecoveryStorageRegistry`];
//! custom storages are added with [`RecoveryStorageRegistry::register`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::config::schema::RecoveryConfig;
use crate::services::ServiceError;

pub trait RecoveryStorage: Send + Sync {
    fn name(&self) -> &str;

    /// Prepare the backing store. Called once before first use.
    fn init(&self) -> Result<(), ServiceError>;

    /// Save the state of one interpreter setting.
    fn persist(&self, setting: &str, state: &str) -> Result<(), ServiceError>;

    /// Load every saved state, keyed by setting name.
    fn recover(&self) -> Result<BTreeMap<String, String>, ServiceError>;
}

pub type RecoveryFactory =
    Arc<dyn Fn(&RecoveryConfig) -> Result<Arc<dyn RecoveryStorage>, ServiceError> + Send + Sync>;

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullRecoveryStorage;

impl RecoveryStorage for NullRecoveryStorage {
    fn name(&self) -> &str {
        "null"
    }

    fn init(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    fn persist(&self, _setting: &str, _state: &str) -> Result<(), ServiceError> {
        Ok(())
    }

    fn recover(&self) -> Result<BTreeMap<String, String>, ServiceError> {
        Ok(BTreeMap::new())
    }
}

/// One `<setting>.json` file per interpreter setting.
#[derive(Debug)]
pub struct FileRecoveryStorage {
    dir: PathBuf,
}

impl FileRecoveryStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, setting: &str) -> PathBuf {
        self.dir.join(format!("{setting}.json"))
    }
}

impl RecoveryStorage for FileRecoveryStorage {
    fn name(&self) -> &str {
        "file"
    }

    fn init(&self) -> Result<(), ServiceError> {
        fs::create_dir_all(&self.dir)?;
        debug!(dir = %self.dir.display(), "Recovery directory ready");
        Ok(())
    }

    fn persist(&self, setting: &str, state: &str) -> Result<(), ServiceError> {
        let document = serde_json::json!({ "setting": setting, "state": state });
        fs::write(self.path_for(setting), serde_json::to_vec_pretty(&document)?)?;
        Ok(())
    }

    fn recover(&self) -> Result<BTreeMap<String, String>, ServiceError> {
        let mut recovered = BTreeMap::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let document: serde_json::Value = serde_json::from_slice(&fs::read(&path)?)?;
            if let (Some(setting), Some(state)) = (
                document.get("setting").and_then(|v| v.as_str()),
                document.get("state").and_then(|v| v.as_str()),
            ) {
                recovered.insert(setting.to_string(), state.to_string());
            }
        }
        Ok(recovered)
    }
}

/// Named recovery storage factories.
#[derive(Clone)]
pub struct RecoveryStorageRegistry {
    factories: HashMap<String, RecoveryFactory>,
}

impl RecoveryStorageRegistry {
    /// Registry without any storage.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding the `null` and `file` storages.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("null", |_| Ok(Arc::new(NullRecoveryStorage)));
        registry.register("file", |config| {
            Ok(Arc::new(FileRecoveryStorage::new(&config.dir)))
        });
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&RecoveryConfig) -> Result<Arc<dyn RecoveryStorage>, ServiceError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct the storage named by `config.storage`.
    pub fn create(&self, config: &RecoveryConfig) -> Result<Arc<dyn RecoveryStorage>, ServiceError> {
        let factory = self.factories.get(config.storage.trim()).ok_or_else(|| {
            ServiceError::NotFound(format!("recovery storage {:?}", config.storage))
        })?;
        factory(config)
    }
}

impl Default for RecoveryStorageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for RecoveryStorageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryStorageRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(storage: &str, dir: &std::path::Path) -> RecoveryConfig {
        RecoveryConfig {
            enabled: true,
            storage: storage.to_string(),
            dir: dir.display().to_string(),
        }
    }

    #[test]
    fn file_storage_round_trips_state() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RecoveryStorageRegistry::with_builtins();
        let storage = registry.create(&config("file", &dir.path().join("r"))).unwrap();

        storage.init().unwrap();
        storage.persist("md", "pid=42").unwrap();
        storage.persist("sh", "pid=43").unwrap();

        let recovered = storage.recover().unwrap();
        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered["md"], "pid=42");
    }

    #[test]
    fn unknown_storage_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RecoveryStorageRegistry::with_builtins();
        assert!(matches!(
            registry.create(&config("zookeeper", dir.path())),
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(registry.names(), vec!["file".to_string(), "null".to_string()]);
    }
}
