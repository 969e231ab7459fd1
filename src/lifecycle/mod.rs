//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Created → Starting → steps 1-9 → collector wait → Running
//!
//! Construction errors (collector.rs):
//!     any thread → ErrorCollector::record → wait_for_at_least_one_error
//!
//! Run once (run_once.rs):
//!     notebook.run_on_start → run all paragraphs → optional shutdown(0|1)
//!
//! Shutdown (shutdown.rs, state.rs):
//!     shutdown(code) → CAS into ShuttingDown (first caller only)
//!         → stop listener → close interpreters → close notebook
//!         → dispose singletons → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → shutdown(0)
//! ```
//!
//! # Design Decisions
//! - Ordered startup: registry and bind first, listener accepts last
//! - Exactly-once teardown guarded by a compare-and-swap on the state
//! - The exit code is returned to the caller; nothing here exits the process

pub mod collector;
pub mod run_once;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use collector::{ConstructionError, ErrorCollector, WaitOutcome};
pub use run_once::{decode_service_context, RunOnceOutcome};
pub use shutdown::Shutdown;
pub use startup::{Orchestrator, OrchestratorBuilder, StartupError};
pub use state::{Lifecycle, LifecycleState};
