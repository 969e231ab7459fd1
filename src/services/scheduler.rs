//! Note scheduling variants.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::info;

use crate::services::ServiceError;

/// Runs notes on a cron schedule.
pub trait SchedulerService: Send + Sync {
    fn name(&self) -> &'static str;

    /// Attach `expression` to `note_id`, replacing any earlier schedule.
    fn schedule(&self, note_id: &str, expression: &str) -> Result<(), ServiceError>;

    fn unschedule(&self, note_id: &str) -> bool;

    /// Current schedules ordered by note id.
    fn jobs(&self) -> BTreeMap<String, String>;

    fn close(&self);
}

/// Scheduling turned off. Every request is refused.
#[derive(Debug, Default)]
pub struct NoScheduler;

impl SchedulerService for NoScheduler {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn schedule(&self, note_id: &str, _expression: &str) -> Result<(), ServiceError> {
        Err(ServiceError::Failed(format!(
            "cannot schedule {note_id}: scheduler disabled"
        )))
    }

    fn unschedule(&self, _note_id: &str) -> bool {
        false
    }

    fn jobs(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn close(&self) {}
}

/// Cron scheduler with a bounded number of concurrent job slots.
#[derive(Debug)]
pub struct CronScheduler {
    pool_size: usize,
    jobs: DashMap<String, String>,
    closed: AtomicBool,
}

impl CronScheduler {
    pub fn new(pool_size: usize) -> Result<Self, ServiceError> {
        if pool_size == 0 {
            return Err(ServiceError::Config(
                "cron scheduler needs at least one worker slot".to_string(),
            ));
        }
        info!(pool_size, "Cron scheduler ready");
        Ok(Self {
            pool_size,
            jobs: DashMap::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

/// Cron expressions have six or seven whitespace-separated fields.
fn is_cron_expression(expression: &str) -> bool {
    matches!(expression.split_whitespace().count(), 6 | 7)
}

impl SchedulerService for CronScheduler {
    fn name(&self) -> &'static str {
        "cron"
    }

    fn schedule(&self, note_id: &str, expression: &str) -> Result<(), ServiceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ServiceError::Closed("scheduler"));
        }
        if !is_cron_expression(expression) {
            return Err(ServiceError::Failed(format!(
                "invalid cron expression for {note_id}: {expression:?}"
            )));
        }
        self.jobs.insert(note_id.to_string(), expression.to_string());
        Ok(())
    }

    fn unschedule(&self, note_id: &str) -> bool {
        self.jobs.remove(note_id).is_some()
    }

    fn jobs(&self) -> BTreeMap<String, String> {
        self.jobs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(jobs = self.jobs.len(), "Cron scheduler stopped");
            self.jobs.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_pool_is_rejected() {
        assert!(matches!(CronScheduler::new(0), Err(ServiceError::Config(_))));
    }

    #[test]
    fn schedules_valid_expressions_only() {
        let scheduler = CronScheduler::new(2).unwrap();
        scheduler.schedule("n1", "0 0 * * * ?").unwrap();
        assert!(scheduler.schedule("n2", "every hour").is_err());
        assert_eq!(scheduler.jobs().len(), 1);

        assert!(scheduler.unschedule("n1"));
        assert!(!scheduler.unschedule("n1"));
    }

    #[test]
    fn closed_scheduler_refuses_work() {
        let scheduler = CronScheduler::new(1).unwrap();
        scheduler.schedule("n1", "0 0 * * * ?").unwrap();
        scheduler.close();
        assert!(scheduler.jobs().is_empty());
        assert!(matches!(
            scheduler.schedule("n1", "0 0 * * * ?"),
            Err(ServiceError::Closed(_))
        ));
    }

    #[test]
    fn disabled_scheduler_refuses_work() {
        assert!(NoScheduler.schedule("n1", "0 0 * * * ?").is_err());
        assert!(NoScheduler.jobs().is_empty());
    }
}
