//! The RPC engine

use crate::{Envelope, Inbound, MessageKind, Replier, TimeoutMap};
use channels::{Channel, ChannelError, CompositeChannel, Handler, Sentinel};
use core_types::{Duration, MessageId};
use logging::{LogLevel, Logger};
use scheduler::{Clock, TaskHandle, TaskScheduler};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// Tunables for a message exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Default reply window for `send_and_receive`
    pub reply_timeout: Duration,
    /// Cadence of the pending-reply expiry sweep
    pub sweep_interval: Duration,
}

impl ExchangeConfig {
    /// Sets the default reply timeout
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Sets the expiry sweep cadence
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_millis(850),
        }
    }
}

/// Errors for exchange operations and request outcomes
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// No reply arrived within the request's timeout window
    #[error("no reply within {} ms", timeout.as_millis())]
    Timeout { timeout: Duration },

    /// The remote responder reported a failure
    #[error("remote error: {message}")]
    Remote { message: String },

    /// The exchange has been disposed
    #[error("exchange is disposed")]
    Disposed,

    /// An owned channel rejected the operation
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Continuation for a `send_and_receive` request
///
/// Invoked exactly once: with the reply payload, a remote error, a
/// timeout, or a disposal error.
pub type ReplyCallback = Box<dyn FnOnce(Result<Value, ExchangeError>)>;

struct ExchangeState {
    pending: TimeoutMap<MessageId, ReplyCallback>,
    disposed: bool,
    sweep: Option<TaskHandle>,
}

/// The RPC engine over channels
///
/// Owns one egress channel (outbound envelopes), one composite ingress
/// (inbound envelopes from transports or twined peers), one dispatch
/// channel (unwrapped local deliveries) and the pending-reply table.
/// Cloning clones a handle to the same exchange.
#[derive(Clone)]
pub struct MessageExchange {
    egress: Channel<Envelope>,
    egress_sentinel: Sentinel,
    ingress: CompositeChannel<Envelope>,
    dispatch: Channel<Inbound>,
    state: Rc<RefCell<ExchangeState>>,
    clock: Rc<dyn Clock>,
    scheduler: TaskScheduler,
    config: ExchangeConfig,
    logger: Logger,
}

impl MessageExchange {
    /// Creates an exchange and schedules its expiry sweep
    pub fn new(
        clock: Rc<dyn Clock>,
        scheduler: TaskScheduler,
        config: ExchangeConfig,
        logger: Logger,
    ) -> Self {
        let egress_sentinel = Sentinel::new();
        let egress = Channel::new(egress_sentinel.clone());
        let ingress = CompositeChannel::new(Sentinel::new());
        let dispatch_sentinel = Sentinel::new();
        let dispatch = Channel::new(dispatch_sentinel.clone());
        let state = Rc::new(RefCell::new(ExchangeState {
            pending: TimeoutMap::new(),
            disposed: false,
            sweep: None,
        }));

        let sweep = scheduler.schedule_repeating(clock.now(), config.sweep_interval, {
            let state = Rc::clone(&state);
            let logger = logger.clone();
            Box::new(move |now| {
                // Drain first: a panicking callback cannot leave a half
                // expired table behind.
                let expired = {
                    let mut state = state.borrow_mut();
                    if state.disposed {
                        return;
                    }
                    state.pending.expire(now)
                };
                for entry in expired {
                    logger.log(
                        logger
                            .entry(LogLevel::Warn, "request timed out without a reply")
                            .with_field("msg_id", entry.key.to_string())
                            .with_field("timeout_ms", entry.timeout.as_millis().to_string()),
                    );
                    (entry.value)(Err(ExchangeError::Timeout {
                        timeout: entry.timeout,
                    }));
                }
            })
        });
        state.borrow_mut().sweep = Some(sweep);

        let inbound: Handler<Envelope> = {
            let state = Rc::clone(&state);
            let egress = egress.clone();
            let egress_sentinel = egress_sentinel.clone();
            let dispatch = dispatch.clone();
            let clock = Rc::clone(&clock);
            let logger = logger.clone();
            Rc::new(move |envelope: &Envelope| {
                handle_inbound(
                    envelope,
                    &state,
                    &egress,
                    &egress_sentinel,
                    &dispatch,
                    &dispatch_sentinel,
                    &clock,
                    &logger,
                );
            })
        };
        ingress
            .subscribe(inbound)
            .expect("fresh ingress accepts its handler");

        Self {
            egress,
            egress_sentinel,
            ingress,
            dispatch,
            state,
            clock,
            scheduler,
            config,
            logger,
        }
    }

    /// Sends a fire-and-forget payload
    ///
    /// No correlation entry is created and nothing fails if no one is
    /// listening on the other side.
    pub fn send(&self, payload: Value) -> Result<MessageId, ExchangeError> {
        if self.state.borrow().disposed {
            return Err(ExchangeError::Disposed);
        }
        let envelope = Envelope::send(payload, self.clock.now());
        self.egress.publish(&self.egress_sentinel, &envelope)?;
        Ok(envelope.msg_id)
    }

    /// Sends a request and registers its reply continuation
    ///
    /// `callback` resolves exactly once: a successful reply, a remote
    /// error, a timeout after `timeout` (default from config), or a
    /// disposal error. Returns the request's message ID.
    pub fn send_and_receive(
        &self,
        payload: Value,
        callback: ReplyCallback,
        timeout: Option<Duration>,
    ) -> Result<MessageId, ExchangeError> {
        if self.state.borrow().disposed {
            return Err(ExchangeError::Disposed);
        }
        let timeout = timeout.unwrap_or(self.config.reply_timeout);
        let now = self.clock.now();
        let envelope = Envelope::request(payload, now);
        self.state
            .borrow_mut()
            .pending
            .insert(envelope.msg_id, callback, timeout, now);
        if let Err(error) = self.egress.publish(&self.egress_sentinel, &envelope) {
            self.state.borrow_mut().pending.remove(&envelope.msg_id);
            return Err(error.into());
        }
        Ok(envelope.msg_id)
    }

    /// Starts receiving inbound envelopes from an upstream channel
    pub fn listen(&self, upstream: &Channel<Envelope>) -> Result<(), ExchangeError> {
        self.ingress.join(upstream).map_err(Into::into)
    }

    /// Stops receiving from an upstream channel
    pub fn leave(&self, upstream: &Channel<Envelope>) -> bool {
        self.ingress.leave(upstream)
    }

    /// Cross-wires two in-process exchanges
    ///
    /// Each listens to the other's egress, so requests and replies flow
    /// both ways without a transport.
    pub fn twine(&self, other: &MessageExchange) -> Result<(), ExchangeError> {
        self.listen(other.egress())?;
        if let Err(error) = other.listen(self.egress()) {
            self.leave(other.egress());
            return Err(error);
        }
        Ok(())
    }

    /// Undoes [`twine`](MessageExchange::twine); returns whether both
    /// directions were wired
    pub fn untwine(&self, other: &MessageExchange) -> bool {
        let ours = self.leave(other.egress());
        let theirs = other.leave(self.egress());
        ours && theirs
    }

    /// The outbound envelope channel (what transports forward)
    pub fn egress(&self) -> &Channel<Envelope> {
        &self.egress
    }

    /// The local delivery channel (what responders subscribe to)
    pub fn dispatch(&self) -> &Channel<Inbound> {
        &self.dispatch
    }

    /// Number of requests still waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Checks whether this exchange has been disposed
    pub fn is_disposed(&self) -> bool {
        self.state.borrow().disposed
    }

    /// Tears down all owned resources
    ///
    /// Idempotent. Pending requests are actively failed with a disposal
    /// error rather than left to hang.
    pub fn dispose(&self) {
        let sweep = {
            let mut state = self.state.borrow_mut();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.sweep.take()
        };
        if let Some(handle) = sweep {
            self.scheduler.cancel(handle);
        }
        let pending = self.state.borrow_mut().pending.drain();
        for (msg_id, callback) in pending {
            self.logger.log(
                self.logger
                    .entry(LogLevel::Debug, "pending request failed by disposal")
                    .with_field("msg_id", msg_id.to_string()),
            );
            callback(Err(ExchangeError::Disposed));
        }
        self.ingress.dispose();
        self.dispatch.dispose();
        self.egress.dispose();
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_inbound(
    envelope: &Envelope,
    state: &Rc<RefCell<ExchangeState>>,
    egress: &Channel<Envelope>,
    egress_sentinel: &Sentinel,
    dispatch: &Channel<Inbound>,
    dispatch_sentinel: &Sentinel,
    clock: &Rc<dyn Clock>,
    logger: &Logger,
) {
    match envelope.kind {
        MessageKind::Send => {
            let unit = Inbound {
                envelope: Envelope::local_dispatch(
                    envelope.msg_id,
                    envelope.payload.clone(),
                    clock.now(),
                ),
                replier: Replier::discard(),
            };
            if dispatch.publish(dispatch_sentinel, &unit).is_err() {
                logger.debug("inbound message dropped: dispatch channel disposed");
            }
        }
        MessageKind::SendAndReceive => {
            let replier = Replier::new({
                let egress = egress.clone();
                let egress_sentinel = egress_sentinel.clone();
                let clock = Rc::clone(clock);
                let logger = logger.clone();
                let request_id = envelope.msg_id;
                Box::new(move |result: Result<Value, String>| {
                    let reply = Envelope::reply(request_id, result, clock.now());
                    if egress.publish(&egress_sentinel, &reply).is_err() {
                        logger.debug("reply dropped: egress disposed");
                    }
                })
            });
            let unit = Inbound {
                envelope: Envelope::local_dispatch(
                    envelope.msg_id,
                    envelope.payload.clone(),
                    clock.now(),
                ),
                replier,
            };
            if dispatch.publish(dispatch_sentinel, &unit).is_err() {
                logger.debug("inbound request dropped: dispatch channel disposed");
            }
        }
        MessageKind::Reply => {
            let Some(request_id) = envelope.reply_to else {
                logger.warn("reply envelope without a correlation id dropped");
                return;
            };
            let callback = state.borrow_mut().pending.remove(&request_id);
            match callback {
                Some(callback) => {
                    let result = match &envelope.error {
                        Some(message) => Err(ExchangeError::Remote {
                            message: message.clone(),
                        }),
                        None => Ok(envelope.payload.clone()),
                    };
                    callback(result);
                }
                None => {
                    logger.log(
                        logger
                            .entry(LogLevel::Debug, "late or unknown reply dropped")
                            .with_field("r_msg_id", request_id.to_string()),
                    );
                }
            }
        }
        MessageKind::LocalDispatch => {
            logger.warn("localDispatch envelope arrived from the wire; dropped");
        }
    }
}
