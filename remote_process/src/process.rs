//! The remote process

use crate::{
    HandshakeConfig, ProcessEvent, ProcessState, SandboxDelegate, SandboxError, HANDSHAKE_ACTION,
};
use channels::{Channel, Sentinel};
use core_types::SandboxHandle;
use exchange::{ExchangeConfig, ExchangeError, MessageExchange, ReplyCallback, Request};
use logging::{LogLevel, Logger};
use scheduler::{Clock, TaskScheduler};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;
use transport::{Transport, TransportError};

/// Per-process liveness probe
///
/// The concrete probe mechanism is the host's business; this core only
/// needs a yes/no with a reason.
pub trait HealthCheckDelegate {
    fn check(&mut self) -> Result<(), String>;
}

/// External hook invoked at the start of a graceful teardown
pub type TeardownHook = Box<dyn FnMut()>;

/// Errors for process operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcessError {
    /// `init` was called on a process that already left `Initializing`
    #[error("process already initialized")]
    AlreadyInitialized,

    /// Sandbox fabrication or teardown failed
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// The handshake could not complete
    #[error("handshake failed: {reason}")]
    HandshakeFailed { reason: String },

    /// The transport rejected wiring
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An exchange rejected wiring
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// The operation needs a running process
    #[error("process is not running (state: {state})")]
    NotRunning { state: ProcessState },
}

/// Configuration of a remote process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Location the sandbox delegate fabricates from
    pub url: String,
    /// Handshake tunables
    pub handshake: HandshakeConfig,
    /// Operational exchange tunables (30 s reply window by default)
    pub exchange: ExchangeConfig,
}

impl ProcessConfig {
    /// Creates a config with default handshake and exchange tunables
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handshake: HandshakeConfig::default(),
            exchange: ExchangeConfig::default(),
        }
    }

    /// Sets the handshake tunables
    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Sets the operational exchange tunables
    pub fn with_exchange(mut self, exchange: ExchangeConfig) -> Self {
        self.exchange = exchange;
        self
    }
}

/// The supervision contract a process manager works against
pub trait Process {
    /// Fabricates the sandbox, binds the transport and starts the
    /// handshake
    fn init(&mut self) -> Result<(), ProcessError>;

    /// Current lifecycle state
    fn state(&self) -> ProcessState;

    /// The operational exchange; `Some` only once running
    fn exchange(&self) -> Option<MessageExchange>;

    /// Handle to the process's event channel
    fn events(&self) -> Channel<ProcessEvent>;

    /// The process's liveness probe, if it has one
    fn health_delegate(&self) -> Option<Rc<RefCell<dyn HealthCheckDelegate>>>;

    /// Invokes the teardown hook and releases every owned resource
    fn graceful_teardown(&mut self);
}

struct ProcessInner {
    state: ProcessState,
    sandbox: Option<SandboxHandle>,
    handshake: Option<MessageExchange>,
    operational: Option<MessageExchange>,
    attempts: u32,
    failure: Option<String>,
}

struct ProcessShared {
    inner: RefCell<ProcessInner>,
    events: Channel<ProcessEvent>,
    events_sentinel: Sentinel,
    transport: Rc<dyn Transport>,
    delegate: Rc<RefCell<dyn SandboxDelegate>>,
    clock: Rc<dyn Clock>,
    scheduler: TaskScheduler,
    logger: Logger,
    config: ProcessConfig,
}

/// A supervised process in a sandboxed execution context
///
/// Fabricates its sandbox through a [`SandboxDelegate`], binds the given
/// transport to the sandbox's ports, handshakes over a short-timeout
/// exchange and then matures a long-lived operational exchange. Failures
/// at any stage make it a zombie and tear the sandbox down.
pub struct RemoteProcess {
    shared: Rc<ProcessShared>,
    health: Option<Rc<RefCell<dyn HealthCheckDelegate>>>,
    teardown_hook: Option<TeardownHook>,
}

impl RemoteProcess {
    /// Creates a process in the `Initializing` state
    pub fn new(
        config: ProcessConfig,
        delegate: Rc<RefCell<dyn SandboxDelegate>>,
        transport: Rc<dyn Transport>,
        clock: Rc<dyn Clock>,
        scheduler: TaskScheduler,
        logger: Logger,
    ) -> Self {
        let events_sentinel = Sentinel::new();
        Self {
            shared: Rc::new(ProcessShared {
                inner: RefCell::new(ProcessInner {
                    state: ProcessState::Initializing,
                    sandbox: None,
                    handshake: None,
                    operational: None,
                    attempts: 0,
                    failure: None,
                }),
                events: Channel::new(events_sentinel.clone()),
                events_sentinel,
                transport,
                delegate,
                clock,
                scheduler,
                logger,
                config,
            }),
            health: None,
            teardown_hook: None,
        }
    }

    /// Attaches a liveness probe
    pub fn with_health_delegate(mut self, delegate: Rc<RefCell<dyn HealthCheckDelegate>>) -> Self {
        self.health = Some(delegate);
        self
    }

    /// Attaches an external teardown hook
    pub fn with_teardown_hook(mut self, hook: TeardownHook) -> Self {
        self.teardown_hook = Some(hook);
        self
    }

    /// Number of greeting attempts made so far
    pub fn handshake_attempts(&self) -> u32 {
        self.shared.inner.borrow().attempts
    }
}

impl Process for RemoteProcess {
    fn init(&mut self) -> Result<(), ProcessError> {
        if self.shared.inner.borrow().state != ProcessState::Initializing {
            return Err(ProcessError::AlreadyInitialized);
        }

        let binding = match self
            .shared
            .delegate
            .borrow_mut()
            .fabricate(&self.shared.config.url)
        {
            Ok(binding) => binding,
            Err(error) => {
                // No sandbox exists, so there is nothing to destroy.
                set_state(&self.shared, ProcessState::Zombie);
                self.shared.inner.borrow_mut().failure = Some(error.to_string());
                publish_event(
                    &self.shared,
                    ProcessEvent::Failed {
                        reason: error.to_string(),
                    },
                );
                return Err(error.into());
            }
        };
        self.shared.inner.borrow_mut().sandbox = Some(binding.handle);

        if let Err(error) = self.shared.transport.bind(binding.ports) {
            fail_process(&self.shared, format!("transport bind failed: {error}"));
            return Err(error.into());
        }
        set_state(&self.shared, ProcessState::Handshaking);

        let handshake_exchange = MessageExchange::new(
            Rc::clone(&self.shared.clock),
            self.shared.scheduler.clone(),
            ExchangeConfig::default()
                .with_reply_timeout(self.shared.config.handshake.attempt_timeout)
                .with_sweep_interval(self.shared.config.handshake.attempt_timeout),
            self.shared.logger.scoped("process.handshake"),
        );
        if let Err(error) = handshake_exchange.listen(self.shared.transport.dispatch_channel()) {
            fail_process(&self.shared, format!("handshake wiring failed: {error}"));
            return Err(error.into());
        }
        if let Err(error) = self.shared.transport.forward(handshake_exchange.egress()) {
            fail_process(&self.shared, format!("handshake wiring failed: {error}"));
            return Err(error.into());
        }
        self.shared.inner.borrow_mut().handshake = Some(handshake_exchange);

        send_attempt(&self.shared);

        // A same-process responder resolves the handshake synchronously;
        // a failure during that first attempt is already terminal.
        let inner = self.shared.inner.borrow();
        if inner.state == ProcessState::Zombie {
            return Err(ProcessError::HandshakeFailed {
                reason: inner
                    .failure
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }
        Ok(())
    }

    fn state(&self) -> ProcessState {
        self.shared.inner.borrow().state
    }

    fn exchange(&self) -> Option<MessageExchange> {
        let inner = self.shared.inner.borrow();
        if inner.state.is_running() {
            inner.operational.clone()
        } else {
            None
        }
    }

    fn events(&self) -> Channel<ProcessEvent> {
        self.shared.events.clone()
    }

    fn health_delegate(&self) -> Option<Rc<RefCell<dyn HealthCheckDelegate>>> {
        self.health.clone()
    }

    fn graceful_teardown(&mut self) {
        if self.shared.inner.borrow().state.is_terminal() {
            return;
        }
        if let Some(hook) = self.teardown_hook.as_mut() {
            hook();
        }
        let (handshake, operational, sandbox) = {
            let mut inner = self.shared.inner.borrow_mut();
            (
                inner.handshake.take(),
                inner.operational.take(),
                inner.sandbox.take(),
            )
        };
        if let Some(exchange) = handshake {
            self.shared.transport.unforward(exchange.egress());
            exchange.dispose();
        }
        if let Some(exchange) = operational {
            self.shared.transport.unforward(exchange.egress());
            exchange.dispose();
        }
        self.shared.transport.dispose();
        set_state(&self.shared, ProcessState::Terminated);
        destroy_sandbox(&self.shared, sandbox);
        publish_event(&self.shared, ProcessEvent::TornDown);
        self.shared.logger.info("process torn down");
    }
}

fn set_state(shared: &Rc<ProcessShared>, next: ProcessState) -> bool {
    let mut inner = shared.inner.borrow_mut();
    if !inner.state.can_transition_to(next) {
        shared.logger.log(
            shared
                .logger
                .entry(LogLevel::Error, "illegal state transition rejected")
                .with_field("from", inner.state.to_string())
                .with_field("to", next.to_string()),
        );
        return false;
    }
    inner.state = next;
    true
}

fn publish_event(shared: &Rc<ProcessShared>, event: ProcessEvent) {
    let _ = shared.events.publish(&shared.events_sentinel, &event);
}

fn destroy_sandbox(shared: &Rc<ProcessShared>, sandbox: Option<SandboxHandle>) {
    let Some(handle) = sandbox else { return };
    if let Err(error) = shared.delegate.borrow_mut().destroy(handle) {
        shared.logger.log(
            shared
                .logger
                .entry(LogLevel::Warn, "sandbox teardown failed")
                .with_field("handle", handle.to_string())
                .with_field("error", error.to_string()),
        );
    }
}

fn send_attempt(shared: &Rc<ProcessShared>) {
    let (exchange, attempt) = {
        let mut inner = shared.inner.borrow_mut();
        if inner.state != ProcessState::Handshaking {
            return;
        }
        inner.attempts += 1;
        (inner.handshake.clone(), inner.attempts)
    };
    let Some(exchange) = exchange else { return };

    let payload = match Request::new(HANDSHAKE_ACTION, json!({ "attempt": attempt })).to_payload() {
        Ok(payload) => payload,
        Err(error) => {
            fail_process(shared, format!("greeting failed to serialize: {error}"));
            return;
        }
    };
    let callback: ReplyCallback = {
        let shared = Rc::clone(shared);
        Box::new(move |result| match result {
            Ok(_ack) => complete_handshake(&shared),
            Err(ExchangeError::Timeout { .. }) => retry_or_fail(&shared),
            Err(ExchangeError::Disposed) => {
                // Torn down mid-handshake; the teardown path owns the
                // state from here.
            }
            Err(error) => {
                fail_process(&shared, format!("handshake rejected: {error}"));
            }
        })
    };
    if let Err(error) = exchange.send_and_receive(payload, callback, None) {
        fail_process(shared, format!("greeting send failed: {error}"));
    }
}

fn retry_or_fail(shared: &Rc<ProcessShared>) {
    let exhausted = {
        let inner = shared.inner.borrow();
        if inner.state != ProcessState::Handshaking {
            return;
        }
        inner.attempts >= shared.config.handshake.max_attempts
    };
    if exhausted {
        fail_process(
            shared,
            format!(
                "no acknowledgement after {} attempts",
                shared.config.handshake.max_attempts
            ),
        );
    } else {
        send_attempt(shared);
    }
}

fn complete_handshake(shared: &Rc<ProcessShared>) {
    if shared.inner.borrow().state != ProcessState::Handshaking {
        return;
    }
    let handshake = shared.inner.borrow_mut().handshake.take();
    if let Some(exchange) = handshake {
        shared.transport.unforward(exchange.egress());
        exchange.dispose();
    }

    let operational = MessageExchange::new(
        Rc::clone(&shared.clock),
        shared.scheduler.clone(),
        shared.config.exchange,
        shared.logger.scoped("process.exchange"),
    );
    if let Err(error) = operational.listen(shared.transport.dispatch_channel()) {
        fail_process(shared, format!("operational wiring failed: {error}"));
        return;
    }
    if let Err(error) = shared.transport.forward(operational.egress()) {
        fail_process(shared, format!("operational wiring failed: {error}"));
        return;
    }
    shared.inner.borrow_mut().operational = Some(operational);
    set_state(shared, ProcessState::Running);
    shared.logger.info("handshake acknowledged; process running");
    publish_event(shared, ProcessEvent::Ready);
}

fn fail_process(shared: &Rc<ProcessShared>, reason: String) {
    if shared.inner.borrow().state.is_terminal() {
        return;
    }
    let (handshake, operational, sandbox) = {
        let mut inner = shared.inner.borrow_mut();
        inner.failure = Some(reason.clone());
        (
            inner.handshake.take(),
            inner.operational.take(),
            inner.sandbox.take(),
        )
    };
    if let Some(exchange) = handshake {
        shared.transport.unforward(exchange.egress());
        exchange.dispose();
    }
    if let Some(exchange) = operational {
        shared.transport.unforward(exchange.egress());
        exchange.dispose();
    }
    shared.transport.dispose();
    set_state(shared, ProcessState::Zombie);
    destroy_sandbox(shared, sandbox);
    shared.logger.log(
        shared
            .logger
            .entry(LogLevel::Error, "process failed")
            .with_field("reason", reason.clone()),
    );
    publish_event(shared, ProcessEvent::Failed { reason });
}
