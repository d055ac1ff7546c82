//! # Contract Tests
//!
//! "Golden" tests for the message-exchange core, to keep its contracts
//! from drifting accidentally over time.
//!
//! ## Philosophy
//!
//! - **Explicit over implicit**: wire spellings and protocol laws are
//!   written down as code
//! - **Testability first**: every scenario runs under virtual time
//! - **Cross-crate**: each module exercises the crates together, the way
//!   real hosts wire them
//!
//! ## Structure
//!
//! - [`wire`]: envelope and frame wire-format contracts
//! - [`scenarios`]: end-to-end protocol scenarios (round trip, timeout
//!   law, spawn failure, manager-wide shutdown)

pub mod scenarios;
pub mod wire;

/// Common helpers for driving the core under virtual time
pub mod test_helpers {
    use core_types::Duration;
    use exchange::{ExchangeConfig, MessageExchange};
    use logging::Logger;
    use scheduler::{Clock, ManualClock, TaskScheduler};
    use std::rc::Rc;

    /// A virtual-time test rig: one clock, one scheduler
    pub struct Rig {
        pub clock: Rc<ManualClock>,
        pub scheduler: TaskScheduler,
    }

    impl Rig {
        pub fn new() -> Self {
            Self {
                clock: Rc::new(ManualClock::new()),
                scheduler: TaskScheduler::new(),
            }
        }

        /// Advances the clock and runs everything that came due
        pub fn tick(&self, delta: Duration) {
            self.clock.advance(delta);
            self.scheduler.run_due(self.clock.now());
        }

        /// Builds an exchange on this rig
        pub fn exchange(&self, config: ExchangeConfig) -> MessageExchange {
            MessageExchange::new(
                self.clock.clone(),
                self.scheduler.clone(),
                config,
                Logger::disabled(),
            )
        }
    }

    impl Default for Rig {
        fn default() -> Self {
            Self::new()
        }
    }
}
