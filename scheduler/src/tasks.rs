//! Cooperative periodic task queue

use core_types::{Duration, Instant};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// Handle for cancelling a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(Uuid);

impl TaskHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task:{}", self.0)
    }
}

/// A periodic task callback, invoked with the tick's "now"
pub type TaskFn = Box<dyn FnMut(Instant)>;

struct ScheduledTask {
    interval: Duration,
    next_due: Instant,
    callback: Rc<RefCell<TaskFn>>,
}

struct SchedulerInner {
    tasks: HashMap<TaskHandle, ScheduledTask>,
}

/// Cooperative scheduler of periodic tasks
///
/// Nothing runs until the host calls [`run_due`](TaskScheduler::run_due)
/// with the current instant. Callbacks may schedule and cancel tasks
/// reentrantly, including cancelling themselves.
pub struct TaskScheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl Clone for TaskScheduler {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl TaskScheduler {
    /// Creates an empty scheduler
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                tasks: HashMap::new(),
            })),
        }
    }

    /// Schedules a task to fire every `interval`, first at `now + interval`
    pub fn schedule_repeating(
        &self,
        now: Instant,
        interval: Duration,
        callback: TaskFn,
    ) -> TaskHandle {
        let handle = TaskHandle::new();
        self.inner.borrow_mut().tasks.insert(
            handle,
            ScheduledTask {
                interval,
                next_due: now + interval,
                callback: Rc::new(RefCell::new(callback)),
            },
        );
        handle
    }

    /// Cancels a task; returns whether it existed
    pub fn cancel(&self, handle: TaskHandle) -> bool {
        self.inner.borrow_mut().tasks.remove(&handle).is_some()
    }

    /// Returns the number of scheduled tasks
    pub fn task_count(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    /// Runs every task that is due at `now`; returns how many ran
    ///
    /// A task that fell multiple intervals behind fires once and is
    /// rescheduled relative to `now` (no catch-up bursts).
    pub fn run_due(&self, now: Instant) -> usize {
        let due: Vec<TaskHandle> = self
            .inner
            .borrow()
            .tasks
            .iter()
            .filter(|(_, task)| task.next_due <= now)
            .map(|(handle, _)| *handle)
            .collect();

        let mut ran = 0;
        for handle in due {
            // Re-check under the borrow: an earlier callback this tick may
            // have cancelled this task.
            let callback = {
                let mut inner = self.inner.borrow_mut();
                match inner.tasks.get_mut(&handle) {
                    Some(task) if task.next_due <= now => {
                        task.next_due = now + task.interval;
                        Rc::clone(&task.callback)
                    }
                    _ => continue,
                }
            };
            (&mut *callback.borrow_mut())(now);
            ran += 1;
        }
        ran
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Clock, ManualClock};
    use std::cell::Cell;

    fn counter_task(count: Rc<Cell<usize>>) -> TaskFn {
        Box::new(move |_| count.set(count.get() + 1))
    }

    #[test]
    fn test_task_not_due_before_interval() {
        let clock = ManualClock::new();
        let scheduler = TaskScheduler::new();
        let count = Rc::new(Cell::new(0));

        scheduler.schedule_repeating(
            clock.now(),
            Duration::from_millis(100),
            counter_task(count.clone()),
        );

        clock.advance(Duration::from_millis(99));
        assert_eq!(scheduler.run_due(clock.now()), 0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_task_fires_on_interval() {
        let clock = ManualClock::new();
        let scheduler = TaskScheduler::new();
        let count = Rc::new(Cell::new(0));

        scheduler.schedule_repeating(
            clock.now(),
            Duration::from_millis(100),
            counter_task(count.clone()),
        );

        clock.advance(Duration::from_millis(100));
        assert_eq!(scheduler.run_due(clock.now()), 1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_task_repeats() {
        let clock = ManualClock::new();
        let scheduler = TaskScheduler::new();
        let count = Rc::new(Cell::new(0));

        scheduler.schedule_repeating(
            clock.now(),
            Duration::from_millis(100),
            counter_task(count.clone()),
        );

        for _ in 0..3 {
            clock.advance(Duration::from_millis(100));
            scheduler.run_due(clock.now());
        }
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn test_no_catch_up_burst() {
        let clock = ManualClock::new();
        let scheduler = TaskScheduler::new();
        let count = Rc::new(Cell::new(0));

        scheduler.schedule_repeating(
            clock.now(),
            Duration::from_millis(100),
            counter_task(count.clone()),
        );

        // Five intervals pass in one go; the task fires once.
        clock.advance(Duration::from_millis(500));
        scheduler.run_due(clock.now());
        assert_eq!(count.get(), 1);

        // And not again until a full interval after that tick.
        clock.advance(Duration::from_millis(99));
        scheduler.run_due(clock.now());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_cancel_stops_task() {
        let clock = ManualClock::new();
        let scheduler = TaskScheduler::new();
        let count = Rc::new(Cell::new(0));

        let handle = scheduler.schedule_repeating(
            clock.now(),
            Duration::from_millis(100),
            counter_task(count.clone()),
        );

        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));

        clock.advance(Duration::from_millis(200));
        scheduler.run_due(clock.now());
        assert_eq!(count.get(), 0);
        assert_eq!(scheduler.task_count(), 0);
    }

    #[test]
    fn test_callback_may_cancel_itself() {
        let clock = ManualClock::new();
        let scheduler = TaskScheduler::new();
        let count = Rc::new(Cell::new(0));

        let handle_slot: Rc<Cell<Option<TaskHandle>>> = Rc::new(Cell::new(None));
        let handle = {
            let scheduler = scheduler.clone();
            let count = count.clone();
            let handle_slot = handle_slot.clone();
            scheduler.clone().schedule_repeating(
                clock.now(),
                Duration::from_millis(100),
                Box::new(move |_| {
                    count.set(count.get() + 1);
                    if let Some(handle) = handle_slot.get() {
                        scheduler.cancel(handle);
                    }
                }),
            )
        };
        handle_slot.set(Some(handle));

        clock.advance(Duration::from_millis(100));
        scheduler.run_due(clock.now());
        clock.advance(Duration::from_millis(100));
        scheduler.run_due(clock.now());

        assert_eq!(count.get(), 1, "task cancelled itself after first run");
    }

    #[test]
    fn test_callback_may_schedule_reentrantly() {
        let clock = ManualClock::new();
        let scheduler = TaskScheduler::new();
        let count = Rc::new(Cell::new(0));

        {
            let scheduler_handle = scheduler.clone();
            let count = count.clone();
            scheduler.schedule_repeating(
                clock.now(),
                Duration::from_millis(100),
                Box::new(move |now| {
                    scheduler_handle.schedule_repeating(
                        now,
                        Duration::from_millis(100),
                        counter_task(count.clone()),
                    );
                }),
            );
        }

        clock.advance(Duration::from_millis(100));
        scheduler.run_due(clock.now());
        assert_eq!(scheduler.task_count(), 2);

        clock.advance(Duration::from_millis(100));
        scheduler.run_due(clock.now());
        assert_eq!(count.get(), 1);
    }
}
