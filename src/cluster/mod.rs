//! Cluster coordinator wiring.
//!
//! # Data Flow
//! ```text
//! cluster.enabled
//!     → listeners registered on the bus (notes, auth, interpreter settings)
//!     → recovery storage created by name and initialized
//!     → interpreter settings persist to and restore from it
//!     → plugin manager gets the cluster interpreter launcher
//!     → transport task started (publish → dispatcher → topic listeners)
//! ```
//!
//! Any recovery storage failure degrades to no cluster wiring at all.

pub mod bus;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::registry::ServiceRegistry;
use crate::services::plugin::CLUSTER_INTERPRETER_LAUNCHER;
use crate::services::recovery::RecoveryStorage;
use crate::services::ServiceError;

pub use bus::{ClusterBus, ClusterMessage};

pub const CLUSTER_NOTE_EVENT_TOPIC: &str = "CLUSTER_NOTE_EVENT_TOPIC";
pub const CLUSTER_AUTH_EVENT_TOPIC: &str = "CLUSTER_AUTH_EVENT_TOPIC";
pub const CLUSTER_INTP_SETTING_EVENT_TOPIC: &str = "CLUSTER_INTP_SETTING_EVENT_TOPIC";

/// Wire the cluster coordinator, if cluster mode is enabled.
///
/// Returns `None` when cluster mode is off or the recovery storage could not
/// be prepared. Must run inside a tokio runtime.
pub fn setup(registry: &ServiceRegistry) -> Option<ClusterManager> {
    let config = registry.config();
    if !config.cluster.enabled {
        return None;
    }

    let bus = Arc::new(ClusterBus::new());
    match registry.notebook_events() {
        Ok(events) => bus.add_listener(CLUSTER_NOTE_EVENT_TOPIC, events),
        Err(e) => warn!(error = %e, "Notebook events not wired to the cluster"),
    }
    match registry.authorization() {
        Ok(authorization) => bus.add_listener(CLUSTER_AUTH_EVENT_TOPIC, authorization),
        Err(e) => warn!(error = %e, "Authorization not wired to the cluster"),
    }
    match registry.interpreter_settings() {
        Ok(settings) => bus.add_listener(CLUSTER_INTP_SETTING_EVENT_TOPIC, settings),
        Err(e) => warn!(error = %e, "Interpreter settings not wired to the cluster"),
    }

    let recovery = match prepare_recovery_storage(registry) {
        Ok(recovery) => recovery,
        Err(e) => {
            error!(storage = %config.recovery.storage, error = %e, "Recovery storage unavailable, cluster wiring skipped");
            return None;
        }
    };
    match registry.interpreter_settings() {
        Ok(settings) => {
            if let Err(e) = settings.attach_recovery(Arc::clone(&recovery)) {
                warn!(error = %e, "Interpreter state not recovered");
            }
        }
        Err(e) => warn!(error = %e, "Interpreter recovery not attached"),
    }
    match registry.plugin_manager() {
        Ok(plugins) => {
            plugins.load_interpreter_launcher(CLUSTER_INTERPRETER_LAUNCHER, Arc::clone(&recovery));
        }
        Err(e) => warn!(error = %e, "Cluster interpreter launcher not loaded"),
    }

    let node_id = match config.cluster.node_id.trim() {
        "" => uuid::Uuid::new_v4().to_string(),
        id => id.to_string(),
    };
    Some(ClusterManager::start(node_id, bus, recovery))
}

fn prepare_recovery_storage(
    registry: &ServiceRegistry,
) -> Result<Arc<dyn RecoveryStorage>, ServiceError> {
    let storage = registry
        .recovery_storages()
        .create(&registry.config().recovery)?;
    storage.init()?;
    Ok(storage)
}

/// A running cluster transport.
pub struct ClusterManager {
    node_id: String,
    bus: Arc<ClusterBus>,
    recovery: Arc<dyn RecoveryStorage>,
    outbox: mpsc::UnboundedSender<ClusterMessage>,
    cancel: CancellationToken,
    transport: JoinHandle<()>,
}

impl ClusterManager {
    fn start(node_id: String, bus: Arc<ClusterBus>, recovery: Arc<dyn RecoveryStorage>) -> Self {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let transport = tokio::spawn(dispatch(Arc::clone(&bus), inbox, cancel.clone()));
        info!(node_id = %node_id, topics = ?bus.topics(), recovery = recovery.name(), "Cluster transport started");
        Self {
            node_id,
            bus,
            recovery,
            outbox,
            cancel,
            transport,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn bus(&self) -> &Arc<ClusterBus> {
        &self.bus
    }

    pub fn recovery(&self) -> &Arc<dyn RecoveryStorage> {
        &self.recovery
    }

    /// Queue `payload` for delivery on `topic`. Fails once stopped.
    pub fn publish(&self, topic: &str, payload: impl Into<String>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.outbox
            .send(ClusterMessage {
                topic: topic.to_string(),
                origin: self.node_id.clone(),
                payload: payload.into(),
            })
            .is_ok()
    }

    pub fn is_running(&self) -> bool {
        !self.transport.is_finished()
    }

    /// Stop the transport. Queued messages are discarded.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            info!(node_id = %self.node_id, "Cluster transport stopped");
        }
    }
}

impl std::fmt::Debug for ClusterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterManager")
            .field("node_id", &self.node_id)
            .field("bus", &self.bus)
            .field("recovery", &self.recovery.name())
            .finish()
    }
}

impl Drop for ClusterManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn dispatch(
    bus: Arc<ClusterBus>,
    mut inbox: mpsc::UnboundedReceiver<ClusterMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = inbox.recv() => match message {
                Some(message) => {
                    bus.deliver(&message);
                }
                None => break,
            },
        }
    }
}
