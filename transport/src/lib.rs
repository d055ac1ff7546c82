//! # Transport
//!
//! Carries envelopes across an execution boundary.
//!
//! ## Architecture
//!
//! A transport sits between two exchanges that cannot share memory. On
//! the way out it wraps envelopes in a [`TransportFrame`] (sender
//! identity, optional destination) and encodes them with a pluggable
//! [`FrameCodec`]; on the way in it decodes, filters by identity and
//! predicate, and republishes bare envelopes on its dispatch channel for
//! a local exchange to `listen` to.
//!
//! The boundary itself is a pair of ports. [`PortLink::pair`] fabricates
//! an in-process pair for tests and sandbox simulation; a real host
//! supplies its own.

pub mod frame;
pub mod ports;
pub mod strategy;

pub use frame::{FrameCodec, JsonCodec, PassthroughCodec, TransportError, TransportFrame, WirePayload};
pub use ports::{Endpoint, PortLink, PortSender};
pub use strategy::{FrameFilter, PortTransport, Transport};
