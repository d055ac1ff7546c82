//! # Core Types
//!
//! Fundamental identifier and time types shared by every crate in the
//! workspace.
//!
//! ## Philosophy
//!
//! - **Explicit over implicit**: Identifiers are typed newtypes and cannot
//!   be confused with one another.
//! - **No ambient time**: `Instant` and `Duration` are plain values; where
//!   "now" comes from is always the caller's decision.
//!
//! ## Key Types
//!
//! - [`MessageId`]: Unique identifier for a wire message
//! - [`EndpointId`]: Identity of a transport endpoint
//! - [`ProcessId`]: Sequential identifier for a managed process
//! - [`SandboxHandle`]: Opaque handle to a fabricated sandbox
//! - [`Instant`] / [`Duration`]: Explicit nanosecond time values

pub mod ids;
pub mod time;

pub use ids::{EndpointId, MessageId, ProcessId, SandboxHandle};
pub use time::{Duration, Instant};
