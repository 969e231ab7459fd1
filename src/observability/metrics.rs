//! Metrics collection and exposition.
//!
//! # Metrics
//! - `notebook_server_startup_phase_seconds` (histogram): duration of each
//!   startup step, labelled by `phase`
//! - `notebook_server_construction_errors_total` (counter): failed singleton
//!   constructions, labelled by `capability`
//! - `notebook_server_lifecycle_state` (gauge): 0=created … 4=stopped

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;

use crate::lifecycle::state::LifecycleState;
use crate::registry::Capability;

pub const STARTUP_PHASE_SECONDS: &str = "notebook_server_startup_phase_seconds";
pub const CONSTRUCTION_ERRORS_TOTAL: &str = "notebook_server_construction_errors_total";
pub const LIFECYCLE_STATE: &str = "notebook_server_lifecycle_state";

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder, or return the one already installed.
pub fn install() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                describe();
                handle
            }
            Err(e) => {
                // Another recorder owns the global slot; render from a
                // detached one so /metrics still answers.
                warn!(error = %e, "Prometheus recorder not installed");
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

fn describe() {
    describe_histogram!(STARTUP_PHASE_SECONDS, "Duration of each startup step");
    describe_counter!(CONSTRUCTION_ERRORS_TOTAL, "Failed singleton constructions");
    describe_gauge!(LIFECYCLE_STATE, "Current lifecycle state");
}

pub fn record_phase(phase: &'static str, elapsed: Duration) {
    histogram!(STARTUP_PHASE_SECONDS, "phase" => phase).record(elapsed.as_secs_f64());
}

pub fn record_construction_error(capability: Capability) {
    counter!(CONSTRUCTION_ERRORS_TOTAL, "capability" => capability.name()).increment(1);
}

pub fn record_lifecycle_state(state: LifecycleState) {
    gauge!(LIFECYCLE_STATE).set(state as u8 as f64);
}
