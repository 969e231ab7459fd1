//! Interpreter setting manager.
//!
//! Tracks which interpreter settings exist and which of them currently have a
//! running process. Executing code is the job of the interpreter processes
//! themselves and is not modelled here.
//!
//! With a recovery storage attached, every started process is persisted as
//! `running` and every stopped one as `stopped`; attaching restores the
//! processes last persisted as `running`.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{info, warn};

use crate::services::recovery::RecoveryStorage;
use crate::services::{ClusterEventListener, ServiceError};

const RUNNING: &str = "running";
const STOPPED: &str = "stopped";

#[derive(Debug, Clone)]
pub struct InterpreterProcess {
    pub setting: String,
    pub started_at: SystemTime,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum SettingEvent {
    Add { name: String },
    Remove { name: String },
}

pub struct InterpreterSettingManager {
    settings: RwLock<BTreeSet<String>>,
    processes: DashMap<String, InterpreterProcess>,
    recovery: RwLock<Option<Arc<dyn RecoveryStorage>>>,
    closed: AtomicBool,
}

impl InterpreterSettingManager {
    pub fn new<I, S>(settings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            settings: RwLock::new(settings.into_iter().map(Into::into).collect()),
            processes: DashMap::new(),
            recovery: RwLock::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Persist process state through `storage` from now on and restore the
    /// processes it last saw running. Returns how many were restored.
    pub fn attach_recovery(&self, storage: Arc<dyn RecoveryStorage>) -> Result<usize, ServiceError> {
        let saved = storage.recover()?;
        let mut restored = 0;
        for (setting, state) in saved {
            if state != RUNNING {
                continue;
            }
            if !self.contains(&setting) {
                warn!(setting = %setting, "Recovered process for unknown setting dropped");
                continue;
            }
            self.processes.entry(setting.clone()).or_insert_with(|| InterpreterProcess {
                setting,
                started_at: SystemTime::now(),
            });
            restored += 1;
        }
        info!(storage = storage.name(), restored, "Interpreter recovery attached");
        *self.recovery.write() = Some(storage);
        Ok(restored)
    }

    fn persist(&self, setting: &str, state: &str) {
        if let Some(storage) = self.recovery.read().as_ref() {
            if let Err(e) = storage.persist(setting, state) {
                warn!(setting, state, error = %e, "Cannot persist interpreter state");
            }
        }
    }

    pub fn settings(&self) -> Vec<String> {
        self.settings.read().iter().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.settings.read().contains(name)
    }

    /// Return the process for `name`, starting it on first use.
    pub fn get_or_start(&self, name: &str) -> Result<InterpreterProcess, ServiceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ServiceError::Closed("interpreter setting manager"));
        }
        if !self.contains(name) {
            return Err(ServiceError::NotFound(format!("interpreter setting {name}")));
        }
        let mut started = false;
        let process = self
            .processes
            .entry(name.to_string())
            .or_insert_with(|| {
                started = true;
                InterpreterProcess {
                    setting: name.to_string(),
                    started_at: SystemTime::now(),
                }
            })
            .value()
            .clone();
        if started {
            self.persist(name, RUNNING);
        }
        Ok(process)
    }

    pub fn running(&self) -> usize {
        self.processes.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop every interpreter process. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let names: Vec<String> = self.processes.iter().map(|p| p.key().clone()).collect();
        self.processes.clear();
        for name in &names {
            self.persist(name, STOPPED);
        }
        info!(stopped = names.len(), "Interpreter processes stopped");
    }
}

impl std::fmt::Debug for InterpreterSettingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterSettingManager")
            .field("settings", &*self.settings.read())
            .field("running", &self.processes.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ClusterEventListener for InterpreterSettingManager {
    fn on_cluster_event(&self, message: &str) {
        match serde_json::from_str::<SettingEvent>(message) {
            Ok(SettingEvent::Add { name }) => {
                self.settings.write().insert(name);
            }
            Ok(SettingEvent::Remove { name }) => {
                self.settings.write().remove(&name);
                if self.processes.remove(&name).is_some() {
                    self.persist(&name, STOPPED);
                }
            }
            Err(e) => warn!(error = %e, "Ignoring malformed interpreter setting event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::recovery::FileRecoveryStorage;

    #[test]
    fn starts_known_settings_once() {
        let manager = InterpreterSettingManager::new(["md", "sh"]);
        let first = manager.get_or_start("md").unwrap();
        let second = manager.get_or_start("md").unwrap();
        assert_eq!(first.started_at, second.started_at);
        assert_eq!(manager.running(), 1);
        assert!(matches!(
            manager.get_or_start("python"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn close_stops_processes() {
        let manager = InterpreterSettingManager::new(["md"]);
        manager.get_or_start("md").unwrap();
        manager.close();
        manager.close();
        assert!(manager.is_closed());
        assert_eq!(manager.running(), 0);
        assert!(manager.get_or_start("md").is_err());
    }

    #[test]
    fn recovery_storage_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn RecoveryStorage> = Arc::new(FileRecoveryStorage::new(dir.path()));
        storage.init().unwrap();

        let before = InterpreterSettingManager::new(["md", "sh"]);
        assert_eq!(before.attach_recovery(Arc::clone(&storage)).unwrap(), 0);
        before.get_or_start("md").unwrap();
        before.get_or_start("sh").unwrap();
        before.on_cluster_event(r#"{"op":"remove","name":"sh"}"#);

        let saved = storage.recover().unwrap();
        assert_eq!(saved["md"], "running");
        assert_eq!(saved["sh"], "stopped");

        let after = InterpreterSettingManager::new(["md", "sh"]);
        assert_eq!(after.attach_recovery(Arc::clone(&storage)).unwrap(), 1);
        assert_eq!(after.running(), 1);

        after.close();
        assert_eq!(storage.recover().unwrap()["md"], "stopped");
    }

    #[test]
    fn cluster_events_change_settings() {
        let manager = InterpreterSettingManager::new(["md"]);
        manager.on_cluster_event(r#"{"op":"add","name":"python"}"#);
        manager.on_cluster_event(r#"{"op":"remove","name":"md"}"#);
        assert_eq!(manager.settings(), vec!["python".to_string()]);
    }
}
