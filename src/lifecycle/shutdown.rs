//! Shutdown coordination for the server.

use std::sync::atomic::{AtomicI32, Ordering};

use tokio_util::sync::CancellationToken;

/// Coordinator for the shutdown outcome.
///
/// Holds the exit code of the request that won the shutdown guard and two
/// tokens: `requested` fires as soon as teardown begins (interrupting any
/// startup wait), `stopped` once teardown has finished.
#[derive(Debug)]
pub struct Shutdown {
    exit_code: AtomicI32,
    requested: CancellationToken,
    stopped: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            exit_code: AtomicI32::new(0),
            requested: CancellationToken::new(),
            stopped: CancellationToken::new(),
        }
    }

    /// Record the winning request and wake anything waiting on `requested`.
    pub fn request(&self, exit_code: i32) {
        self.exit_code.store(exit_code, Ordering::SeqCst);
        self.requested.cancel();
    }

    /// Mark teardown finished.
    pub fn complete(&self) {
        self.stopped.cancel();
    }

    /// Token cancelled once shutdown has been requested.
    pub fn requested_token(&self) -> CancellationToken {
        self.requested.clone()
    }

    pub fn is_complete(&self) -> bool {
        self.stopped.is_cancelled()
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::SeqCst)
    }

    /// Wait for teardown to finish and return the recorded exit code.
    pub async fn wait(&self) -> i32 {
        self.stopped.cancelled().await;
        self.exit_code()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_recorded_code() {
        let shutdown = Shutdown::new();
        let token = shutdown.requested_token();
        assert!(!token.is_cancelled());

        shutdown.request(3);
        assert!(token.is_cancelled());
        assert!(!shutdown.is_complete());

        shutdown.complete();
        assert_eq!(shutdown.wait().await, 3);
    }
}
