//! Pid capability handles
//!
//! A `Pid` is what the manager hands out: enough authority to message a
//! process and watch its fate, and nothing more. The matching
//! `PidController` stays with the manager and is the only way to signal
//! errors or termination, mirroring the split between a token anyone can
//! hold and the source only its owner holds.

use channels::{Channel, Sentinel};
use core_types::{Duration, MessageId, ProcessId};
use exchange::{ExchangeError, MessageExchange, ReplyCallback};
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Events observable through a Pid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PidEvent {
    /// The process was signalled unhealthy or failed
    ErrorSignaled { reason: String },
    /// The process is gone for good
    Terminated,
}

/// Errors for messaging through a Pid
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PidError {
    /// The process has terminated
    #[error("process is terminated")]
    Terminated,

    /// The process has no operational exchange yet (or any more)
    #[error("process is not ready for messaging")]
    NotReady,

    /// The underlying exchange rejected the operation
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// Resolves the process's operational exchange on demand
pub(crate) type ExchangeProvider = Rc<dyn Fn() -> Option<MessageExchange>>;

struct PidState {
    process_id: ProcessId,
    provider: Option<ExchangeProvider>,
    error: Option<String>,
    terminated: bool,
}

/// Capability handle for messaging a managed process
///
/// Cheap to clone and safe to hand to unrelated code: it exposes the
/// process's message path and fate, never the process object itself.
#[derive(Clone)]
pub struct Pid {
    state: Rc<RefCell<PidState>>,
    events: Channel<PidEvent>,
}

impl Pid {
    /// The manager-allocated process id
    pub fn process_id(&self) -> ProcessId {
        self.state.borrow().process_id
    }

    /// Sends a fire-and-forget payload to the process
    pub fn send(&self, payload: Value) -> Result<MessageId, PidError> {
        let exchange = self.exchange()?;
        exchange.send(payload).map_err(Into::into)
    }

    /// Sends a request to the process
    pub fn send_and_receive(
        &self,
        payload: Value,
        callback: ReplyCallback,
        timeout: Option<Duration>,
    ) -> Result<MessageId, PidError> {
        let exchange = self.exchange()?;
        exchange
            .send_and_receive(payload, callback, timeout)
            .map_err(Into::into)
    }

    /// Events about this process's fate
    pub fn events(&self) -> &Channel<PidEvent> {
        &self.events
    }

    /// Checks whether the process has terminated
    pub fn is_terminated(&self) -> bool {
        self.state.borrow().terminated
    }

    /// The most recent error signal, if any
    pub fn error_signal(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    fn exchange(&self) -> Result<MessageExchange, PidError> {
        let provider = {
            let state = self.state.borrow();
            if state.terminated {
                return Err(PidError::Terminated);
            }
            state.provider.clone()
        };
        provider
            .and_then(|provider| provider())
            .ok_or(PidError::NotReady)
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Pid")
            .field("process_id", &state.process_id)
            .field("terminated", &state.terminated)
            .field("error", &state.error)
            .finish()
    }
}

/// The manager-held authority over a Pid
#[derive(Clone)]
pub struct PidController {
    pid: Pid,
    sentinel: Sentinel,
}

impl PidController {
    /// Creates a Pid and its controller
    pub(crate) fn new(process_id: ProcessId, provider: ExchangeProvider) -> Self {
        let sentinel = Sentinel::new();
        let pid = Pid {
            state: Rc::new(RefCell::new(PidState {
                process_id,
                provider: Some(provider),
                error: None,
                terminated: false,
            })),
            events: Channel::new(sentinel.clone()),
        };
        Self { pid, sentinel }
    }

    /// A clone of the public handle
    pub fn pid(&self) -> Pid {
        self.pid.clone()
    }

    /// Puts the Pid into the error-signaled state
    pub(crate) fn signal_error(&self, reason: String) {
        self.pid.state.borrow_mut().error = Some(reason.clone());
        self.publish(&PidEvent::ErrorSignaled { reason });
    }

    /// Marks the process terminated and cuts the message path
    ///
    /// Idempotent: only the first call publishes the event.
    pub(crate) fn signal_terminated(&self) {
        {
            let mut state = self.pid.state.borrow_mut();
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.provider = None;
        }
        self.publish(&PidEvent::Terminated);
    }

    fn publish(&self, event: &PidEvent) {
        // Construction pairs the sentinel with the channel; the only
        // failure mode left is a disposed channel, which has no one to
        // tell.
        let _ = self.pid.events.publish(&self.sentinel, event);
    }
}
