//! Run a single note during startup.
//!
//! Configured through `notebook.run_on_start`. The note runs with the decoded
//! service context; with `auto_shutdown` the outcome decides the exit code.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use thiserror::Error;
use tracing::{error, info};

use crate::config::schema::RunOnStartConfig;
use crate::registry::ServiceRegistry;
use crate::services::context::ServiceContext;

#[derive(Debug, Error)]
pub enum ServiceContextError {
    #[error("service context is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("service context is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode a base64 JSON service context. Blank means anonymous with no roles.
pub fn decode_service_context(encoded: &str) -> Result<ServiceContext, ServiceContextError> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Ok(ServiceContext::anonymous());
    }
    let raw = BASE64_STANDARD.decode(encoded)?;
    Ok(serde_json::from_slice(&raw)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOnceOutcome {
    /// No note configured.
    Disabled,
    /// The note ran; `success` is whether every paragraph finished.
    Finished { success: bool },
    /// The note could not be run at all.
    Failed(String),
}

impl RunOnceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOnceOutcome::Finished { success: true })
    }

    /// Exit code used when the run is followed by an automatic shutdown.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Run the configured note, if any. Never panics and never fails startup.
pub fn run_note_on_start(config: &RunOnStartConfig, registry: &ServiceRegistry) -> RunOnceOutcome {
    let note_id = config.note_id.trim();
    if note_id.is_empty() {
        return RunOnceOutcome::Disabled;
    }

    let context = match decode_service_context(&config.service_context) {
        Ok(context) => context,
        Err(e) => {
            error!(note_id, error = %e, "Cannot run note on start");
            return RunOnceOutcome::Failed(e.to_string());
        }
    };
    let service = match registry.notebook_service() {
        Ok(service) => service,
        Err(e) => return RunOnceOutcome::Failed(e.to_string()),
    };

    info!(note_id, user = context.user(), "Running note on start");
    match service.run_all_paragraphs(note_id, &context) {
        Ok(success) => {
            info!(note_id, success, "Note on start finished");
            RunOnceOutcome::Finished { success }
        }
        Err(e) => {
            error!(note_id, error = %e, "Note on start failed");
            RunOnceOutcome::Failed(e.to_string())
        }
    }
}
