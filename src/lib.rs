//! Notebook server bootstrap library.

pub mod cluster;
pub mod config;
pub mod lifecycle;
pub mod management;
pub mod net;
pub mod observability;
pub mod registry;
pub mod services;
pub mod web;

pub use config::schema::ServerConfig;
pub use lifecycle::{Orchestrator, Shutdown};
pub use registry::ServiceRegistry;
