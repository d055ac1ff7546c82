//! # Exchange
//!
//! The RPC engine: wire envelopes, reply correlation and dispatch.
//!
//! ## Philosophy
//!
//! - **Envelopes, not method calls**: everything crossing an exchange is
//!   an [`Envelope`] with a message ID; replies correlate by ID, never by
//!   order
//! - **Exactly once**: a request callback resolves exactly once, with a
//!   reply, a remote error, a timeout or a disposal error
//! - **Local code sees one shape**: responders only ever handle
//!   [`Inbound`] dispatch units; the wire format stays inside the
//!   exchange
//!
//! ## Architecture
//!
//! A [`MessageExchange`] owns an egress channel (outbound envelopes), a
//! composite ingress (fan-in from any number of transports or twined
//! peers), a dispatch channel (unwrapped local deliveries) and a
//! [`TimeoutMap`] of pending reply callbacks swept on a fixed cadence.

pub mod dispatch;
pub mod envelope;
pub mod exchange;
pub mod responder;
pub mod timeout_map;

pub use dispatch::{Inbound, Replier};
pub use envelope::{Envelope, MessageKind};
pub use exchange::{ExchangeConfig, ExchangeError, MessageExchange, ReplyCallback};
pub use responder::{Request, Responder};
pub use timeout_map::{ExpiredEntry, TimeoutMap};
