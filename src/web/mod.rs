//! Web surface registration.
//!
//! The REST and WebSocket handlers of a full deployment live outside this
//! crate. They plug in through [`WebSurface`], which is asked for its routes
//! before the service registry exists; handlers reach the registry through a
//! [`RegistryCell`] that is filled in later in startup.

use std::sync::{Arc, OnceLock};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::registry::ServiceRegistry;
use crate::services::ServiceError;

/// Set once the registry has been built.
pub type RegistryCell = Arc<OnceLock<Arc<ServiceRegistry>>>;

pub trait WebSurface: Send + Sync {
    /// Routes merged into the primary router.
    fn register(&self, registry: RegistryCell) -> Router;
}

/// Read-only notebook API.
#[derive(Debug, Default)]
pub struct NotebookWebSurface;

impl WebSurface for NotebookWebSurface {
    fn register(&self, registry: RegistryCell) -> Router {
        Router::new()
            .route("/api/version", get(version))
            .route("/api/notebook", get(list_notes))
            .route("/api/notebook/{note_id}", get(get_note))
            .with_state(registry)
    }
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "status": "SERVICE_UNAVAILABLE" })),
    )
        .into_response()
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK", "body": { "version": env!("CARGO_PKG_VERSION") } }))
}

async fn list_notes(State(registry): State<RegistryCell>) -> Response {
    match registry.get().and_then(|r| r.peek_notebook()) {
        Some(notebook) => Json(json!({ "status": "OK", "body": notebook.list_notes() })).into_response(),
        None => unavailable(),
    }
}

async fn get_note(State(registry): State<RegistryCell>, Path(note_id): Path<String>) -> Response {
    let Some(notebook) = registry.get().and_then(|r| r.peek_notebook()) else {
        return unavailable();
    };
    match notebook.get_note(&note_id) {
        Ok(note) => Json(json!({ "status": "OK", "body": note })).into_response(),
        Err(ServiceError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "NOT_FOUND", "message": format!("note {note_id} not found") })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "INTERNAL_SERVER_ERROR", "message": e.to_string() })),
        )
            .into_response(),
    }
}
