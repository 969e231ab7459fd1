//! Management endpoints.
//!
//! Attached to the primary router during startup when `management.enabled`.
//! Served by the same listener as everything else.

pub mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::lifecycle::state::Lifecycle;
use self::handlers::*;

#[derive(Clone)]
pub struct ManagementState {
    pub lifecycle: Arc<Lifecycle>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn setup_management_router(state: ManagementState) -> Router {
    Router::new()
        .route("/health/readiness", get(readiness))
        .route("/health/liveness", get(liveness))
        .route("/ping", get(ping))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}
