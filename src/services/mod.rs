//! Collaborator interfaces and built-in variants.
//!
//! # Data Flow
//! ```text
//! registry (factory per variant)
//!     → auth.rs        (authentication: realm | none, authorization)
//!     → scheduler.rs   (cron | disabled)
//!     → search.rs      (indexed | disabled)
//!     → notebook.rs    (parser, repository, notebook aggregate, run-all service)
//!     → interpreter.rs (interpreter setting manager)
//!     → recovery.rs    (recovery storage registry: null | file)
//!     → events.rs      (notebook event hub)
//!     → plugin.rs      (interpreter launchers)
//! ```
//!
//! # Design Decisions
//! - Each capability is a trait where more than one variant exists
//! - Built-ins are deliberately small; execution engines, REST handlers and
//!   storage formats live outside this crate
//! - Everything is `Send + Sync` and shared through `Arc`

pub mod auth;
pub mod context;
pub mod events;
pub mod interpreter;
pub mod notebook;
pub mod plugin;
pub mod recovery;
pub mod scheduler;
pub mod search;

use thiserror::Error;

use crate::lifecycle::collector::ConstructionError;

pub use auth::{AuthenticationService, AuthorizationService, NoAuthentication, RealmAuthentication};
pub use context::{AuthenticationInfo, ServiceContext};
pub use events::NotebookEventHub;
pub use interpreter::InterpreterSettingManager;
pub use notebook::{Note, NoteParser, Notebook, NotebookRepo, NotebookService};
pub use plugin::PluginManager;
pub use recovery::{RecoveryStorage, RecoveryStorageRegistry};
pub use scheduler::SchedulerService;
pub use search::SearchService;

/// Errors raised by collaborators.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Format(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("dependency unavailable: {0}")]
    Dependency(#[from] ConstructionError),

    #[error("{0}")]
    Failed(String),
}

/// Receives messages published on a cluster event topic.
pub trait ClusterEventListener: Send + Sync {
    fn on_cluster_event(&self, message: &str);
}
