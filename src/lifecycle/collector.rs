//! Construction error collection.
//!
//! Singletons are built lazily, sometimes on blocking worker threads, so the
//! set of constructors that will have run by a given point is not known in
//! advance. Every failure is funnelled into one [`ErrorCollector`]; the
//! startup sequence then waits a bounded time for the first failure and
//! infers success from silence.

use std::fmt;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::observability::metrics;
use crate::registry::Capability;

/// A singleton constructor failed.
#[derive(Debug, Clone, Error)]
#[error("failed to construct {capability}: {detail}")]
pub struct ConstructionError {
    pub capability: Capability,
    pub detail: String,
    pub at: SystemTime,
}

/// Result of [`ErrorCollector::wait_for_at_least_one_error`].
#[derive(Debug)]
pub enum WaitOutcome {
    /// At least one error was recorded. Holds every error recorded so far.
    Errors(Vec<ConstructionError>),
    /// The window elapsed without a single error.
    Elapsed,
    /// The wait was interrupted by a shutdown request.
    Cancelled,
}

/// Thread-safe sink for construction failures.
pub struct ErrorCollector {
    errors: Mutex<Vec<ConstructionError>>,
    recorded: watch::Sender<usize>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        let (recorded, _) = watch::channel(0);
        Self {
            errors: Mutex::new(Vec::new()),
            recorded,
        }
    }

    /// Record a failure. Callable from any thread.
    pub fn record(&self, capability: Capability, detail: impl Into<String>) -> ConstructionError {
        let error = ConstructionError {
            capability,
            detail: detail.into(),
            at: SystemTime::now(),
        };
        error!(capability = %capability, detail = %error.detail, "Singleton construction failed");
        metrics::record_construction_error(capability);

        let count = {
            let mut errors = self.errors.lock();
            errors.push(error.clone());
            errors.len()
        };
        self.recorded.send_replace(count);
        error
    }

    /// Snapshot of every error recorded so far.
    pub fn errors(&self) -> Vec<ConstructionError> {
        self.errors.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until an error is recorded, the timeout elapses, or `cancel` fires.
    pub async fn wait_for_at_least_one_error(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        let mut rx = self.recorded.subscribe();
        let first_error = async move {
            let _ = rx.wait_for(|count| *count > 0).await;
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return WaitOutcome::Cancelled,
            _ = tokio::time::timeout(timeout, first_error) => {}
        }

        let errors = self.errors();
        if errors.is_empty() {
            WaitOutcome::Elapsed
        } else {
            WaitOutcome::Errors(errors)
        }
    }
}

impl Default for ErrorCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ErrorCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorCollector")
            .field("errors", &self.len())
            .finish()
    }
}
