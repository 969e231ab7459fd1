use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::lifecycle::state::LifecycleState;
use crate::management::ManagementState;

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub healthy: bool,
    pub message: String,
}

fn report(checks: BTreeMap<&'static str, CheckResult>) -> Response {
    let status = if checks.values().all(|c| c.healthy) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(checks)).into_response()
}

/// Ready once startup completed and until shutdown begins.
pub async fn readiness(State(state): State<ManagementState>) -> Response {
    let current = state.lifecycle.current();
    let mut checks = BTreeMap::new();
    checks.insert(
        "lifecycle",
        CheckResult {
            healthy: current == LifecycleState::Running,
            message: current.to_string(),
        },
    );
    report(checks)
}

/// Alive until teardown has finished.
pub async fn liveness(State(state): State<ManagementState>) -> Response {
    let current = state.lifecycle.current();
    let mut checks = BTreeMap::new();
    checks.insert(
        "lifecycle",
        CheckResult {
            healthy: current != LifecycleState::Stopped,
            message: current.to_string(),
        },
    );
    report(checks)
}

pub async fn ping() -> &'static str {
    "pong"
}

pub async fn render_metrics(State(state): State<ManagementState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
