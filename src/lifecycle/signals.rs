//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGINT and SIGTERM once startup begins
//! - Turn the first signal into `Orchestrator::shutdown(0)`
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Holds only a weak reference so a dropped orchestrator is not kept alive
//! - A handler that cannot be installed is logged and never fires

use std::future::pending;
use std::sync::Weak;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::lifecycle::startup::Orchestrator;

/// Spawn the signal listener. It exits early when `stop` is cancelled.
pub fn spawn_signal_listener(
    orchestrator: Weak<Orchestrator>,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = stop.cancelled() => {}
            signal = wait_for_signal() => {
                info!(signal, "Shutdown signal received");
                deliver(&orchestrator, signal);
            }
        }
    })
}

/// Request shutdown on behalf of `signal`. Returns whether this call ran the
/// teardown.
pub(crate) fn deliver(orchestrator: &Weak<Orchestrator>, signal: &str) -> bool {
    match orchestrator.upgrade() {
        Some(orchestrator) => orchestrator.shutdown(0),
        None => {
            warn!(signal, "Signal received after the server was dropped");
            false
        }
    }
}

async fn wait_for_signal() -> &'static str {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGINT");
                pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = pending::<&'static str>();

    tokio::select! {
        signal = interrupt => signal,
        signal = terminate => signal,
    }
}
