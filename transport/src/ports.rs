//! Boundary ports
//!
//! A transport is given an [`Endpoint`]: a channel it listens on and a
//! sender it posts through. Where those lead is the host's business.
//! [`PortLink::pair`] builds a cross-wired in-process pair, which is all
//! a sandbox simulation or a test needs.

use crate::WirePayload;
use channels::{Channel, ChannelError, Sentinel};

/// The posting half of a boundary port
///
/// Bundles the channel with the sentinel that authorizes publishing on
/// it, so holding a `PortSender` is holding the right to post.
#[derive(Clone)]
pub struct PortSender {
    channel: Channel<WirePayload>,
    sentinel: Sentinel,
}

impl PortSender {
    /// Creates a sender from a channel and its owning sentinel
    pub fn new(channel: Channel<WirePayload>, sentinel: Sentinel) -> Self {
        Self { channel, sentinel }
    }

    /// Posts a payload across the boundary
    pub fn post(&self, payload: &WirePayload) -> Result<(), ChannelError> {
        self.channel.publish(&self.sentinel, payload)
    }
}

/// One side's view of a boundary
#[derive(Clone)]
pub struct Endpoint {
    /// Payloads arriving from the far side
    pub inbound: Channel<WirePayload>,
    /// Posts payloads to the far side
    pub outbound: PortSender,
}

/// Fabricates in-process boundary port pairs
pub struct PortLink;

impl PortLink {
    /// Creates two cross-wired endpoints
    ///
    /// What one side posts, the other side's inbound channel delivers,
    /// synchronously.
    pub fn pair() -> (Endpoint, Endpoint) {
        let near_sentinel = Sentinel::new();
        let near_to_far = Channel::new(near_sentinel.clone());
        let far_sentinel = Sentinel::new();
        let far_to_near = Channel::new(far_sentinel.clone());

        let near = Endpoint {
            inbound: far_to_near.clone(),
            outbound: PortSender::new(near_to_far.clone(), near_sentinel),
        };
        let far = Endpoint {
            inbound: near_to_far,
            outbound: PortSender::new(far_to_near, far_sentinel),
        };
        (near, far)
    }
}
