//! Lifecycle state machine.
//!
//! ```text
//! Created → Starting → Running → ShuttingDown → Stopped
//! ```
//!
//! Transitions only move forward. `ShuttingDown` may be entered from any
//! earlier state, exactly once; the compare-and-swap that wins that
//! transition is the shutdown guard.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;

use crate::observability::metrics;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Created = 0,
    Starting = 1,
    Running = 2,
    ShuttingDown = 3,
    Stopped = 4,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("cannot move from {actual} to {to} (expected {expected})")]
    InvalidTransition {
        expected: LifecycleState,
        actual: LifecycleState,
        to: LifecycleState,
    },
}

/// Atomic holder of the current [`LifecycleState`].
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Created as u8),
        }
    }

    pub fn current(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from exactly `from` to `to`.
    pub fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), LifecycleError> {
        let rejected = |actual| LifecycleError::InvalidTransition {
            expected: from,
            actual,
            to,
        };
        if to <= from {
            return Err(rejected(self.current()));
        }
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|actual| rejected(LifecycleState::from_u8(actual)))?;
        metrics::record_lifecycle_state(to);
        Ok(())
    }

    /// Enter `ShuttingDown` from any earlier state.
    ///
    /// Returns the previous state for the single winning caller, or the
    /// current state for everyone else.
    pub fn begin_shutdown(&self) -> Result<LifecycleState, LifecycleState> {
        let target = LifecycleState::ShuttingDown as u8;
        let result = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < target).then_some(target)
            })
            .map(LifecycleState::from_u8)
            .map_err(LifecycleState::from_u8);
        if result.is_ok() {
            metrics::record_lifecycle_state(LifecycleState::ShuttingDown);
        }
        result
    }

    pub fn is_shutting_down(&self) -> bool {
        self.current() >= LifecycleState::ShuttingDown
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn forward_transitions() {
        let lifecycle = Lifecycle::new();
        lifecycle
            .transition(LifecycleState::Created, LifecycleState::Starting)
            .unwrap();
        lifecycle
            .transition(LifecycleState::Starting, LifecycleState::Running)
            .unwrap();
        assert_eq!(lifecycle.current(), LifecycleState::Running);
    }

    #[test]
    fn backward_transition_rejected() {
        let lifecycle = Lifecycle::new();
        lifecycle
            .transition(LifecycleState::Created, LifecycleState::Starting)
            .unwrap();
        assert!(lifecycle
            .transition(LifecycleState::Starting, LifecycleState::Created)
            .is_err());
        assert_eq!(lifecycle.current(), LifecycleState::Starting);
    }

    #[test]
    fn start_only_once() {
        let lifecycle = Lifecycle::new();
        lifecycle
            .transition(LifecycleState::Created, LifecycleState::Starting)
            .unwrap();
        let err = lifecycle
            .transition(LifecycleState::Created, LifecycleState::Starting)
            .unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                expected: LifecycleState::Created,
                actual: LifecycleState::Starting,
                to: LifecycleState::Starting,
            }
        );
    }

    #[test]
    fn shutdown_from_created_is_allowed() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.begin_shutdown(), Ok(LifecycleState::Created));
        assert_eq!(lifecycle.begin_shutdown(), Err(LifecycleState::ShuttingDown));
    }

    #[test]
    fn running_blocked_after_shutdown_started() {
        let lifecycle = Lifecycle::new();
        lifecycle
            .transition(LifecycleState::Created, LifecycleState::Starting)
            .unwrap();
        lifecycle.begin_shutdown().unwrap();
        assert!(lifecycle
            .transition(LifecycleState::Starting, LifecycleState::Running)
            .is_err());
        assert!(lifecycle.is_shutting_down());
    }

    #[test]
    fn exactly_one_thread_wins_shutdown() {
        let lifecycle = Arc::new(Lifecycle::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if lifecycle.begin_shutdown().is_ok() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
