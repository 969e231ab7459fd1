//! Interpreter launcher plugins.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::services::recovery::RecoveryStorage;

/// Launcher name used when interpreters are started through the cluster.
pub const CLUSTER_INTERPRETER_LAUNCHER: &str = "ClusterInterpreterLauncher";

/// A loaded launcher and the recovery storage it persists process state to.
pub struct InterpreterLauncher {
    pub name: String,
    pub recovery: Arc<dyn RecoveryStorage>,
}

impl std::fmt::Debug for InterpreterLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterLauncher")
            .field("name", &self.name)
            .field("recovery", &self.recovery.name())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct PluginManager {
    launchers: DashMap<String, Arc<InterpreterLauncher>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load (or replace) the launcher `name`.
    pub fn load_interpreter_launcher(
        &self,
        name: &str,
        recovery: Arc<dyn RecoveryStorage>,
    ) -> Arc<InterpreterLauncher> {
        let launcher = Arc::new(InterpreterLauncher {
            name: name.to_string(),
            recovery,
        });
        self.launchers.insert(name.to_string(), Arc::clone(&launcher));
        info!(launcher = name, recovery = launcher.recovery.name(), "Interpreter launcher loaded");
        launcher
    }

    pub fn launcher(&self, name: &str) -> Option<Arc<InterpreterLauncher>> {
        self.launchers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn launcher_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.launchers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
