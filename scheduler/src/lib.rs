//! # Scheduler
//!
//! Injected time and cooperative periodic tasks.
//!
//! ## Philosophy
//!
//! - **Deterministic**: all progress happens inside explicit
//!   [`TaskScheduler::run_due`] ticks, no hidden threads or timers
//! - **Testability first**: a [`ManualClock`] makes every time-dependent
//!   behavior (reply timeouts, health probes) testable under virtual time
//! - **Mechanism not policy**: the scheduler fires callbacks on cadence;
//!   what they do is the owner's business
//!
//! ## Example
//!
//! ```
//! use core_types::Duration;
//! use scheduler::{Clock, ManualClock, TaskScheduler};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let clock = Rc::new(ManualClock::new());
//! let scheduler = TaskScheduler::new();
//! let fired = Rc::new(Cell::new(0));
//!
//! let counter = fired.clone();
//! scheduler.schedule_repeating(
//!     clock.now(),
//!     Duration::from_millis(850),
//!     Box::new(move |_| counter.set(counter.get() + 1)),
//! );
//!
//! clock.advance(Duration::from_millis(850));
//! scheduler.run_due(clock.now());
//! assert_eq!(fired.get(), 1);
//! ```

pub mod clock;
pub mod tasks;

pub use clock::{Clock, ManualClock};
pub use tasks::{TaskFn, TaskHandle, TaskScheduler};
