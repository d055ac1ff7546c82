//! Periodic liveness probes

use core_types::{Duration, Instant};
use logging::{LogLevel, Logger};
use remote_process::HealthCheckDelegate;
use scheduler::{TaskHandle, TaskScheduler};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Tunables for health checking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Time between liveness probes
    pub interval: Duration,
}

impl HealthCheckConfig {
    /// Sets the probe interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Invoked with the probe's reason whenever a health check fails
pub type HealthFailureFn = Rc<dyn Fn(String)>;

/// Periodic liveness probe bound to one process's delegate
///
/// A failing probe never throws; it reports through the failure
/// callback and keeps probing. Disposal cancels the probe task and is
/// idempotent.
pub struct HealthChecker {
    scheduler: TaskScheduler,
    task: RefCell<Option<TaskHandle>>,
}

impl HealthChecker {
    /// Creates a checker and schedules its probe task
    pub fn new(
        delegate: Rc<RefCell<dyn HealthCheckDelegate>>,
        config: HealthCheckConfig,
        now: Instant,
        scheduler: TaskScheduler,
        on_failure: HealthFailureFn,
        logger: Logger,
    ) -> Self {
        let task = scheduler.schedule_repeating(
            now,
            config.interval,
            Box::new(move |_| match delegate.borrow_mut().check() {
                Ok(()) => {}
                Err(reason) => {
                    logger.log(
                        logger
                            .entry(LogLevel::Warn, "health check failed")
                            .with_field("reason", reason.clone()),
                    );
                    on_failure(reason);
                }
            }),
        );
        Self {
            scheduler,
            task: RefCell::new(Some(task)),
        }
    }

    /// Checks whether the probe task is still scheduled
    pub fn is_active(&self) -> bool {
        self.task.borrow().is_some()
    }

    /// Cancels the probe task; idempotent
    pub fn dispose(&self) {
        if let Some(task) = self.task.borrow_mut().take() {
            self.scheduler.cancel(task);
        }
    }
}
