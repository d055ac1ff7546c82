//! # Process Manager
//!
//! Supervises a set of remote processes.
//!
//! ## Philosophy
//!
//! - **Mechanism not policy**: the manager spawns, health-checks and
//!   tears down. What to do about a failing process (restart, alert,
//!   back off) belongs to watchdog logic layered above, triggered by
//!   [`Pid`] events.
//! - **Capabilities over references**: a [`Pid`] lets unrelated code
//!   message a process and observe its fate without ever holding the
//!   process object or the manager.
//!
//! ## Key Types
//!
//! - [`ProcessManager`]: spawn / attach / shutdown
//! - [`HealthChecker`]: periodic liveness probe per process
//! - [`Pid`] / [`PidController`]: the capability handle and its
//!   manager-held controller

pub mod health;
pub mod manager;
pub mod pid;

pub use health::{HealthCheckConfig, HealthChecker, HealthFailureFn};
pub use manager::{ManagerError, ManagerEvent, ProcessManager};
pub use pid::{Pid, PidController, PidError, PidEvent};
