//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (startup phase timings, construction errors, lifecycle state)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or observability.log_level)
//!     → /metrics (Prometheus scrape, served by the management surface)
//! ```
//!
//! # Design Decisions
//! - Metric updates go through the `metrics` facade and are no-ops until a
//!   recorder is installed
//! - The recorder is process-global; installing twice reuses the first handle

pub mod logging;
pub mod metrics;
