//! The port transport strategy

use crate::{Endpoint, FrameCodec, TransportError, TransportFrame, WirePayload};
use channels::{Channel, Handler, Sentinel};
use core_types::EndpointId;
use exchange::Envelope;
use logging::{LogLevel, Logger};
use std::cell::RefCell;
use std::rc::Rc;

/// Predicate over frames; `false` drops the frame
pub type FrameFilter = Rc<dyn Fn(&TransportFrame) -> bool>;

/// A strategy for moving envelopes across a boundary
///
/// Exchanges never see this trait; they `listen` to the dispatch channel
/// and stay oblivious to framing, codecs and ports.
pub trait Transport {
    /// Forwards everything published on `upstream` across the boundary
    fn forward(&self, upstream: &Channel<Envelope>) -> Result<(), TransportError>;

    /// Stops forwarding from `upstream`; returns whether it was forwarded
    fn unforward(&self, upstream: &Channel<Envelope>) -> bool;

    /// Attaches to a boundary endpoint
    fn bind(&self, endpoint: Endpoint) -> Result<(), TransportError>;

    /// Detaches from the bound endpoint; returns whether one was bound
    fn unbind(&self) -> bool;

    /// Decoded, filtered inbound envelopes
    fn dispatch_channel(&self) -> &Channel<Envelope>;

    /// Unbinds, stops all forwarding and disposes the dispatch channel
    fn dispose(&self);
}

struct BoundEndpoint {
    endpoint: Endpoint,
    listener: Handler<WirePayload>,
}

struct ForwardEntry {
    upstream: Channel<Envelope>,
    handler: Handler<Envelope>,
}

struct TransportState {
    bound: Option<BoundEndpoint>,
    forwards: Vec<ForwardEntry>,
}

/// Message-passing transport over a pair of boundary ports
///
/// Outbound envelopes are wrapped in a [`TransportFrame`] carrying this
/// transport's identity (and optional fixed destination), encoded by the
/// configured codec and posted on the outbound port. Inbound payloads
/// are decoded, dropped unless addressed to this identity, run through
/// the optional filter, and republished bare on the dispatch channel.
#[derive(Clone)]
pub struct PortTransport {
    identity: EndpointId,
    destination: Option<EndpointId>,
    codec: Rc<dyn FrameCodec>,
    inbound_filter: Option<FrameFilter>,
    outbound_filter: Option<FrameFilter>,
    dispatch: Channel<Envelope>,
    dispatch_sentinel: Sentinel,
    state: Rc<RefCell<TransportState>>,
    logger: Logger,
}

impl PortTransport {
    /// Creates a transport with the given identity and codec
    pub fn new(identity: EndpointId, codec: Rc<dyn FrameCodec>, logger: Logger) -> Self {
        let dispatch_sentinel = Sentinel::new();
        Self {
            identity,
            destination: None,
            codec,
            inbound_filter: None,
            outbound_filter: None,
            dispatch: Channel::new(dispatch_sentinel.clone()),
            dispatch_sentinel,
            state: Rc::new(RefCell::new(TransportState {
                bound: None,
                forwards: Vec::new(),
            })),
            logger,
        }
    }

    /// Addresses every outbound frame to a fixed destination
    pub fn with_destination(mut self, destination: EndpointId) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Drops inbound frames the predicate rejects
    pub fn with_inbound_filter(mut self, filter: FrameFilter) -> Self {
        self.inbound_filter = Some(filter);
        self
    }

    /// Drops outbound frames the predicate rejects
    pub fn with_outbound_filter(mut self, filter: FrameFilter) -> Self {
        self.outbound_filter = Some(filter);
        self
    }

    /// This transport's endpoint identity
    pub fn identity(&self) -> &EndpointId {
        &self.identity
    }

    fn post_outbound(&self, envelope: &Envelope) {
        let frame = TransportFrame {
            sender: self.identity.clone(),
            destination: self.destination.clone(),
            envelope: envelope.clone(),
        };
        if let Some(filter) = &self.outbound_filter {
            if !filter(&frame) {
                self.logger.debug("outbound frame rejected by filter");
                return;
            }
        }
        let payload = match self.codec.encode(&frame) {
            Ok(payload) => payload,
            Err(error) => {
                self.logger.log(
                    self.logger
                        .entry(LogLevel::Warn, "outbound frame failed to encode")
                        .with_field("error", error.to_string()),
                );
                return;
            }
        };
        let outbound = self
            .state
            .borrow()
            .bound
            .as_ref()
            .map(|bound| bound.endpoint.outbound.clone());
        match outbound {
            Some(sender) => {
                if let Err(error) = sender.post(&payload) {
                    self.logger.log(
                        self.logger
                            .entry(LogLevel::Warn, "outbound post failed")
                            .with_field("error", error.to_string()),
                    );
                }
            }
            None => self.logger.debug("no endpoint bound; outbound frame dropped"),
        }
    }

    fn accept_inbound(&self, payload: &WirePayload) {
        let frame = match self.codec.decode(payload) {
            Ok(frame) => frame,
            Err(error) => {
                self.logger.log(
                    self.logger
                        .entry(LogLevel::Warn, "inbound payload failed to decode")
                        .with_field("error", error.to_string()),
                );
                return;
            }
        };
        if let Some(destination) = &frame.destination {
            if *destination != self.identity {
                self.logger.log(
                    self.logger
                        .entry(LogLevel::Debug, "inbound frame for another identity dropped")
                        .with_field("destination", destination.to_string()),
                );
                return;
            }
        }
        if let Some(filter) = &self.inbound_filter {
            if !filter(&frame) {
                self.logger.debug("inbound frame rejected by filter");
                return;
            }
        }
        if self
            .dispatch
            .publish(&self.dispatch_sentinel, &frame.envelope)
            .is_err()
        {
            self.logger.debug("dispatch channel disposed; inbound frame dropped");
        }
    }
}

impl Transport for PortTransport {
    fn forward(&self, upstream: &Channel<Envelope>) -> Result<(), TransportError> {
        let handler: Handler<Envelope> = {
            let transport = self.clone();
            Rc::new(move |envelope: &Envelope| transport.post_outbound(envelope))
        };
        upstream.subscribe(handler.clone())?;
        self.state.borrow_mut().forwards.push(ForwardEntry {
            upstream: upstream.clone(),
            handler,
        });
        Ok(())
    }

    fn unforward(&self, upstream: &Channel<Envelope>) -> bool {
        let entry = {
            let mut state = self.state.borrow_mut();
            match state
                .forwards
                .iter()
                .position(|entry| entry.upstream.same_channel(upstream))
            {
                Some(index) => state.forwards.remove(index),
                None => return false,
            }
        };
        entry.upstream.unsubscribe(&entry.handler);
        true
    }

    fn bind(&self, endpoint: Endpoint) -> Result<(), TransportError> {
        if self.state.borrow().bound.is_some() {
            return Err(TransportError::AlreadyBound);
        }
        let listener: Handler<WirePayload> = {
            let transport = self.clone();
            Rc::new(move |payload: &WirePayload| transport.accept_inbound(payload))
        };
        endpoint.inbound.subscribe(listener.clone())?;
        self.state.borrow_mut().bound = Some(BoundEndpoint { endpoint, listener });
        Ok(())
    }

    fn unbind(&self) -> bool {
        let bound = self.state.borrow_mut().bound.take();
        match bound {
            Some(bound) => {
                bound.endpoint.inbound.unsubscribe(&bound.listener);
                true
            }
            None => false,
        }
    }

    fn dispatch_channel(&self) -> &Channel<Envelope> {
        &self.dispatch
    }

    fn dispose(&self) {
        self.unbind();
        let forwards = std::mem::take(&mut self.state.borrow_mut().forwards);
        for entry in forwards {
            entry.upstream.unsubscribe(&entry.handler);
        }
        self.dispatch.dispose();
    }
}
