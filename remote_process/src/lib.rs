//! # Remote Process
//!
//! Owns a sandboxed execution context and matures a message exchange to
//! it.
//!
//! ## Lifecycle
//!
//! ```text
//! Initializing --fabricate + bind--> Handshaking --ack--> Running
//!       |                                 |                  |
//!       +------- any failure ------> Zombie <----------------+
//!                                      |
//!                              sandbox teardown
//! ```
//!
//! Shutdown moves any live state to `Terminated`. There is no way out of
//! `Zombie` or `Terminated`.
//!
//! The handshake runs over a short-timeout exchange so attempts retry
//! quickly; once the remote side acknowledges, the process swaps in an
//! operational exchange with the normal reply window and reports
//! [`ProcessEvent::Ready`] on its event channel.

pub mod handshake;
pub mod lifecycle;
pub mod process;
pub mod sandbox;

pub use handshake::{handshake_responder, HandshakeConfig, HANDSHAKE_ACTION};
pub use lifecycle::{ProcessEvent, ProcessState};
pub use process::{
    HealthCheckDelegate, Process, ProcessConfig, ProcessError, RemoteProcess, TeardownHook,
};
pub use sandbox::{SandboxBinding, SandboxDelegate, SandboxError};
