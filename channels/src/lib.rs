//! # Channels
//!
//! Single-owner, multi-subscriber message buses.
//!
//! ## Philosophy
//!
//! - **Ownership is a capability**: only the holder of a channel's
//!   [`Sentinel`] may publish on it. The sentinel is an unforgeable token
//!   compared by identity, not a value that can be guessed.
//! - **Synchronous, ordered delivery**: a publish notifies every current
//!   subscriber before it returns, in subscription order.
//! - **No hidden execution**: there are no threads and no queues; a
//!   channel is a list of handlers and nothing more.
//!
//! ## Key Types
//!
//! - [`Sentinel`]: publish-authorization token
//! - [`Channel`]: the pub/sub primitive
//! - [`CompositeChannel`]: fan-in over multiple upstream channels

pub mod channel;
pub mod composite;
pub mod sentinel;

pub use channel::{Channel, ChannelError, Handler};
pub use composite::CompositeChannel;
pub use sentinel::Sentinel;
