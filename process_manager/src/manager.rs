//! Process manager runtime with supervision

use crate::pid::ExchangeProvider;
use crate::{HealthCheckConfig, HealthChecker, Pid, PidController};
use channels::{Channel, ChannelError, Handler, Sentinel};
use core_types::ProcessId;
use logging::{LogLevel, Logger};
use remote_process::{Process, ProcessError, ProcessEvent};
use scheduler::{Clock, TaskScheduler};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use thiserror::Error;

/// Events the manager publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerEvent {
    /// Manager-wide shutdown completed
    DidShutdown,
}

/// Errors for manager operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManagerError {
    /// The spawned process failed to initialize
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Event wiring failed
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

struct ManagedEntry {
    process: Rc<RefCell<dyn Process>>,
    controller: PidController,
    health: Option<HealthChecker>,
    listener: Handler<ProcessEvent>,
    events_channel: Channel<ProcessEvent>,
}

struct ManagerInner {
    entries: BTreeMap<ProcessId, ManagedEntry>,
    next_id: u64,
    did_shutdown: bool,
}

/// Supervises a set of processes
///
/// Spawning attaches the process (sequential id, [`Pid`] handle, health
/// checker, event wiring) and then initializes it; failures tear the
/// partial process down before the error is returned. Shutdown is
/// idempotent per process and manager-wide.
pub struct ProcessManager {
    inner: Rc<RefCell<ManagerInner>>,
    events: Channel<ManagerEvent>,
    events_sentinel: Sentinel,
    clock: Rc<dyn Clock>,
    scheduler: TaskScheduler,
    health_config: HealthCheckConfig,
    logger: Logger,
}

impl ProcessManager {
    /// Creates an empty manager
    pub fn new(
        clock: Rc<dyn Clock>,
        scheduler: TaskScheduler,
        health_config: HealthCheckConfig,
        logger: Logger,
    ) -> Self {
        let events_sentinel = Sentinel::new();
        Self {
            inner: Rc::new(RefCell::new(ManagerInner {
                entries: BTreeMap::new(),
                next_id: 0,
                did_shutdown: false,
            })),
            events: Channel::new(events_sentinel.clone()),
            events_sentinel,
            clock,
            scheduler,
            health_config,
            logger,
        }
    }

    /// Builds a process, attaches it and initializes it
    ///
    /// On any failure the partially-created process is torn down
    /// best-effort before the error is returned.
    pub fn spawn<F>(&self, factory: F) -> Result<Pid, ManagerError>
    where
        F: FnOnce() -> Rc<RefCell<dyn Process>>,
    {
        let process = factory();
        let pid = self.attach(Rc::clone(&process))?;
        let init_result = process.borrow_mut().init();
        if let Err(error) = init_result {
            self.logger.log(
                self.logger
                    .entry(LogLevel::Warn, "spawn failed; tearing down partial process")
                    .with_field("process_id", pid.process_id().to_string())
                    .with_field("error", error.to_string()),
            );
            self.execute_shutdown_process(pid.process_id());
            return Err(error.into());
        }
        Ok(pid)
    }

    /// Takes over supervision of a process
    ///
    /// Allocates the next sequential id, builds the [`Pid`], wires the
    /// event listener and starts a health checker if the process carries
    /// a probe delegate.
    pub fn attach(&self, process: Rc<RefCell<dyn Process>>) -> Result<Pid, ManagerError> {
        let process_id = {
            let mut inner = self.inner.borrow_mut();
            inner.next_id += 1;
            ProcessId::from_raw(inner.next_id)
        };

        let provider: ExchangeProvider = {
            let weak = Rc::downgrade(&process);
            Rc::new(move || {
                weak.upgrade()
                    .and_then(|process| process.try_borrow().ok().and_then(|p| p.exchange()))
            })
        };
        let controller = PidController::new(process_id, provider);

        let listener: Handler<ProcessEvent> = {
            let controller = controller.clone();
            let logger = self.logger.clone();
            Rc::new(move |event: &ProcessEvent| match event {
                ProcessEvent::Ready => logger.log(
                    logger
                        .entry(LogLevel::Info, "process reported ready")
                        .with_field("process_id", controller.pid().process_id().to_string()),
                ),
                ProcessEvent::Failed { reason } => controller.signal_error(reason.clone()),
                ProcessEvent::TornDown => {}
            })
        };
        let events_channel = process.borrow().events();
        events_channel.subscribe(listener.clone())?;

        let health = process.borrow().health_delegate().map(|delegate| {
            HealthChecker::new(
                delegate,
                self.health_config,
                self.clock.now(),
                self.scheduler.clone(),
                {
                    let controller = controller.clone();
                    Rc::new(move |reason| controller.signal_error(reason))
                },
                self.logger.scoped("manager.health"),
            )
        });

        self.inner.borrow_mut().entries.insert(
            process_id,
            ManagedEntry {
                process,
                controller: controller.clone(),
                health,
                listener,
                events_channel,
            },
        );
        self.logger.log(
            self.logger
                .entry(LogLevel::Info, "process attached")
                .with_field("process_id", process_id.to_string()),
        );
        Ok(controller.pid())
    }

    /// Tears down one process: graceful teardown, health checker
    /// disposal, Pid termination signal
    ///
    /// Returns whether a process was found; repeating is a no-op.
    pub fn execute_shutdown_process(&self, process_id: ProcessId) -> bool {
        let entry = self.inner.borrow_mut().entries.remove(&process_id);
        let Some(entry) = entry else {
            return false;
        };
        entry.events_channel.unsubscribe(&entry.listener);
        entry.process.borrow_mut().graceful_teardown();
        if let Some(health) = &entry.health {
            health.dispose();
        }
        entry.controller.signal_terminated();
        self.logger.log(
            self.logger
                .entry(LogLevel::Info, "process shut down")
                .with_field("process_id", process_id.to_string()),
        );
        true
    }

    /// Shuts down every owned process and emits
    /// [`ManagerEvent::DidShutdown`] exactly once
    pub fn shutdown(&self) {
        let ids: Vec<ProcessId> = self.inner.borrow().entries.keys().copied().collect();
        for process_id in ids {
            self.execute_shutdown_process(process_id);
        }
        let first = {
            let mut inner = self.inner.borrow_mut();
            !std::mem::replace(&mut inner.did_shutdown, true)
        };
        if first {
            let _ = self
                .events
                .publish(&self.events_sentinel, &ManagerEvent::DidShutdown);
            self.logger.info("manager shut down");
        }
    }

    /// The manager's event channel
    pub fn events(&self) -> &Channel<ManagerEvent> {
        &self.events
    }

    /// Pid of a managed process
    pub fn pid(&self, process_id: ProcessId) -> Option<Pid> {
        self.inner
            .borrow()
            .entries
            .get(&process_id)
            .map(|entry| entry.controller.pid())
    }

    /// Number of processes currently supervised
    pub fn process_count(&self) -> usize {
        self.inner.borrow().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PidEvent;
    use core_types::Duration;
    use exchange::{ExchangeConfig, MessageExchange};
    use remote_process::{HealthCheckDelegate, ProcessState};
    use scheduler::ManualClock;
    use serde_json::json;
    use std::cell::Cell;

    struct Rig {
        clock: Rc<ManualClock>,
        scheduler: TaskScheduler,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                clock: Rc::new(ManualClock::new()),
                scheduler: TaskScheduler::new(),
            }
        }

        fn manager(&self) -> ProcessManager {
            ProcessManager::new(
                self.clock.clone(),
                self.scheduler.clone(),
                HealthCheckConfig::default(),
                Logger::disabled(),
            )
        }

        fn tick(&self, delta: Duration) {
            self.clock.advance(delta);
            self.scheduler.run_due(self.clock.now());
        }
    }

    struct StubProcess {
        state: ProcessState,
        exchange: Option<MessageExchange>,
        events: Channel<ProcessEvent>,
        events_sentinel: Sentinel,
        init_fails: bool,
        teardowns: Rc<Cell<usize>>,
        health: Option<Rc<RefCell<dyn HealthCheckDelegate>>>,
        clock: Rc<ManualClock>,
        scheduler: TaskScheduler,
    }

    impl StubProcess {
        fn new(rig: &Rig, init_fails: bool) -> Self {
            let events_sentinel = Sentinel::new();
            Self {
                state: ProcessState::Initializing,
                exchange: None,
                events: Channel::new(events_sentinel.clone()),
                events_sentinel,
                init_fails,
                teardowns: Rc::new(Cell::new(0)),
                health: None,
                clock: rig.clock.clone(),
                scheduler: rig.scheduler.clone(),
            }
        }

        fn with_health(mut self, delegate: Rc<RefCell<dyn HealthCheckDelegate>>) -> Self {
            self.health = Some(delegate);
            self
        }
    }

    impl Process for StubProcess {
        fn init(&mut self) -> Result<(), ProcessError> {
            if self.init_fails {
                self.state = ProcessState::Zombie;
                let _ = self.events.publish(
                    &self.events_sentinel,
                    &ProcessEvent::Failed {
                        reason: "scripted failure".to_string(),
                    },
                );
                return Err(ProcessError::HandshakeFailed {
                    reason: "scripted failure".to_string(),
                });
            }
            self.exchange = Some(MessageExchange::new(
                self.clock.clone(),
                self.scheduler.clone(),
                ExchangeConfig::default(),
                Logger::disabled(),
            ));
            self.state = ProcessState::Running;
            let _ = self
                .events
                .publish(&self.events_sentinel, &ProcessEvent::Ready);
            Ok(())
        }

        fn state(&self) -> ProcessState {
            self.state
        }

        fn exchange(&self) -> Option<MessageExchange> {
            if self.state.is_running() {
                self.exchange.clone()
            } else {
                None
            }
        }

        fn events(&self) -> Channel<ProcessEvent> {
            self.events.clone()
        }

        fn health_delegate(&self) -> Option<Rc<RefCell<dyn HealthCheckDelegate>>> {
            self.health.clone()
        }

        fn graceful_teardown(&mut self) {
            if self.state.is_terminal() {
                return;
            }
            self.teardowns.set(self.teardowns.get() + 1);
            if let Some(exchange) = &self.exchange {
                exchange.dispose();
            }
            self.state = ProcessState::Terminated;
            let _ = self
                .events
                .publish(&self.events_sentinel, &ProcessEvent::TornDown);
        }
    }

    struct FailingProbe;

    impl HealthCheckDelegate for FailingProbe {
        fn check(&mut self) -> Result<(), String> {
            Err("no heartbeat".to_string())
        }
    }

    fn collect_pid_events(pid: &Pid) -> Rc<RefCell<Vec<PidEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let handler: Handler<PidEvent> = {
            let seen = seen.clone();
            Rc::new(move |event: &PidEvent| seen.borrow_mut().push(event.clone()))
        };
        pid.events().subscribe(handler).unwrap();
        seen
    }

    #[test]
    fn test_spawn_allocates_sequential_ids() {
        let rig = Rig::new();
        let manager = rig.manager();

        let first = manager
            .spawn(|| Rc::new(RefCell::new(StubProcess::new(&rig, false))))
            .unwrap();
        let second = manager
            .spawn(|| Rc::new(RefCell::new(StubProcess::new(&rig, false))))
            .unwrap();

        assert_eq!(first.process_id(), ProcessId::from_raw(1));
        assert_eq!(second.process_id(), ProcessId::from_raw(2));
        assert_eq!(manager.process_count(), 2);
    }

    #[test]
    fn test_pid_messages_running_process() {
        let rig = Rig::new();
        let manager = rig.manager();
        let pid = manager
            .spawn(|| Rc::new(RefCell::new(StubProcess::new(&rig, false))))
            .unwrap();

        assert!(pid.send(json!({"op": "poke"})).is_ok());
        assert!(!pid.is_terminated());
    }

    #[test]
    fn test_spawn_failure_tears_down_partial_process() {
        let rig = Rig::new();
        let manager = rig.manager();

        let result = manager.spawn(|| Rc::new(RefCell::new(StubProcess::new(&rig, true))));

        assert!(matches!(
            result,
            Err(ManagerError::Process(ProcessError::HandshakeFailed { .. }))
        ));
        assert_eq!(manager.process_count(), 0);
        assert_eq!(rig.scheduler.task_count(), 0, "health probe cancelled");
    }

    #[test]
    fn test_health_failure_signals_pid() {
        let rig = Rig::new();
        let manager = rig.manager();
        let pid = manager
            .spawn(|| {
                Rc::new(RefCell::new(
                    StubProcess::new(&rig, false)
                        .with_health(Rc::new(RefCell::new(FailingProbe))),
                ))
            })
            .unwrap();
        let events = collect_pid_events(&pid);

        rig.tick(Duration::from_secs(10));

        assert_eq!(pid.error_signal(), Some("no heartbeat".to_string()));
        assert_eq!(
            *events.borrow(),
            vec![PidEvent::ErrorSignaled {
                reason: "no heartbeat".to_string()
            }]
        );
        assert_eq!(manager.process_count(), 1, "policy stays external");
    }

    #[test]
    fn test_process_failure_event_signals_pid() {
        let rig = Rig::new();
        let manager = rig.manager();
        let stub = Rc::new(RefCell::new(StubProcess::new(&rig, false)));
        let pid = manager.attach(stub.clone() as Rc<RefCell<dyn Process>>).unwrap();

        // The process fails on its own later; the listener relays it.
        {
            let stub = stub.borrow();
            stub.events
                .publish(
                    &stub.events_sentinel,
                    &ProcessEvent::Failed {
                        reason: "sandbox crashed".to_string(),
                    },
                )
                .unwrap();
        }
        assert_eq!(pid.error_signal(), Some("sandbox crashed".to_string()));
    }

    #[test]
    fn test_execute_shutdown_process_is_idempotent() {
        let rig = Rig::new();
        let manager = rig.manager();
        let teardowns = {
            let stub = StubProcess::new(&rig, false);
            let teardowns = stub.teardowns.clone();
            manager
                .spawn(move || Rc::new(RefCell::new(stub)))
                .unwrap();
            teardowns
        };

        assert!(manager.execute_shutdown_process(ProcessId::from_raw(1)));
        assert!(!manager.execute_shutdown_process(ProcessId::from_raw(1)));
        assert_eq!(teardowns.get(), 1);
        assert_eq!(manager.process_count(), 0);
    }

    #[test]
    fn test_manager_wide_shutdown() {
        let rig = Rig::new();
        let manager = rig.manager();
        let pid = manager
            .spawn(|| Rc::new(RefCell::new(StubProcess::new(&rig, false))))
            .unwrap();
        let pid_events = collect_pid_events(&pid);

        let manager_events = Rc::new(RefCell::new(Vec::new()));
        let handler: Handler<ManagerEvent> = {
            let manager_events = manager_events.clone();
            Rc::new(move |event: &ManagerEvent| manager_events.borrow_mut().push(*event))
        };
        manager.events().subscribe(handler).unwrap();

        manager.shutdown();
        manager.shutdown();

        assert_eq!(manager.process_count(), 0);
        assert!(pid.is_terminated());
        assert_eq!(pid.send(json!(1)), Err(crate::PidError::Terminated));
        assert_eq!(*pid_events.borrow(), vec![PidEvent::Terminated]);
        assert_eq!(
            *manager_events.borrow(),
            vec![ManagerEvent::DidShutdown],
            "exactly once"
        );
    }

    #[test]
    fn test_pid_lookup_after_shutdown_is_gone() {
        let rig = Rig::new();
        let manager = rig.manager();
        let pid = manager
            .spawn(|| Rc::new(RefCell::new(StubProcess::new(&rig, false))))
            .unwrap();

        assert!(manager.pid(pid.process_id()).is_some());
        manager.shutdown();
        assert!(manager.pid(pid.process_id()).is_none());
    }
}
