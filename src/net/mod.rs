//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! TlsConfig
//!     → tls.rs (PEM pair XOR keystore, optional trust store)
//!     → TlsSetup::{Disabled, Enabled(TlsMaterial)}
//!     → listener.rs (bind address:port or address:ssl_port, attach connector)
//!     → PreparedListener::serve (accepting starts, owned by the orchestrator)
//! ```
//!
//! # Design Decisions
//! - TLS material is resolved before the socket is bound
//! - PEM and keystore inputs are never merged
//! - Binding happens early; accepting happens last

pub mod listener;
pub mod tls;

pub use listener::{Connector, ListenerError, PreparedListener};
pub use tls::{TlsError, TlsMaterial, TlsSetup};
