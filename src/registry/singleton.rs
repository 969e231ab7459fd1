//! Lazily constructed, failure-caching singleton slot.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::lifecycle::collector::{ConstructionError, ErrorCollector};
use crate::registry::Capability;
use crate::services::ServiceError;

enum Slot<T: ?Sized> {
    Vacant,
    Ready(Arc<T>),
    Failed(ConstructionError),
}

/// Holds at most one instance of `T`.
///
/// The first caller runs the constructor while holding the slot lock, so
/// concurrent callers wait for that one construction instead of racing. A
/// failure is recorded in the collector once and then returned to every
/// later caller.
pub struct Singleton<T: ?Sized> {
    capability: Capability,
    slot: Mutex<Slot<T>>,
}

impl<T: ?Sized> Singleton<T> {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            slot: Mutex::new(Slot::Vacant),
        }
    }

    /// Return the instance, constructing it on first use.
    ///
    /// The flag is `true` only for the call that performed the construction.
    pub fn get_or_init<F>(
        &self,
        init: F,
        collector: &ErrorCollector,
    ) -> Result<(Arc<T>, bool), ConstructionError>
    where
        F: FnOnce() -> Result<Arc<T>, ServiceError>,
    {
        let mut slot = self.slot.lock();
        match &*slot {
            Slot::Ready(instance) => return Ok((Arc::clone(instance), false)),
            Slot::Failed(error) => return Err(error.clone()),
            Slot::Vacant => {}
        }

        match init() {
            Ok(instance) => {
                *slot = Slot::Ready(Arc::clone(&instance));
                Ok((instance, true))
            }
            Err(e) => {
                let error = collector.record(self.capability, e.to_string());
                *slot = Slot::Failed(error.clone());
                Err(error)
            }
        }
    }

    /// The instance if it has already been constructed. Never constructs.
    pub fn peek(&self) -> Option<Arc<T>> {
        match &*self.slot.lock() {
            Slot::Ready(instance) => Some(Arc::clone(instance)),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(&*self.slot.lock(), Slot::Failed(_))
    }

    /// Remove the instance, returning it to the caller to drop.
    pub fn take(&self) -> Option<Arc<T>> {
        match std::mem::replace(&mut *self.slot.lock(), Slot::Vacant) {
            Slot::Ready(instance) => Some(instance),
            _ => None,
        }
    }
}
