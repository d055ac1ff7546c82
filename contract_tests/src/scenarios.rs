//! End-to-end protocol scenarios
//!
//! Each test wires the crates the way a real host would and drives them
//! under virtual time.

#[cfg(test)]
mod tests {
    use crate::test_helpers::Rig;
    use channels::{Channel, Handler, Sentinel};
    use core_types::{Duration, EndpointId, SandboxHandle};
    use exchange::{
        Envelope, ExchangeConfig, ExchangeError, Inbound, MessageExchange, Request, Responder,
    };
    use logging::Logger;
    use process_manager::{HealthCheckConfig, ManagerEvent, PidError, ProcessManager};
    use remote_process::{
        handshake_responder, HandshakeConfig, HealthCheckDelegate, Process, ProcessConfig,
        ProcessState, RemoteProcess, SandboxBinding, SandboxDelegate, SandboxError,
    };
    use scheduler::Clock;
    use serde_json::{json, Value};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use transport::{PassthroughCodec, PortLink, PortTransport, Transport};

    fn recording() -> (
        Rc<RefCell<Vec<Result<Value, ExchangeError>>>>,
        impl FnOnce(&MessageExchange, Value, Option<Duration>),
    ) {
        let results: Rc<RefCell<Vec<Result<Value, ExchangeError>>>> =
            Rc::new(RefCell::new(Vec::new()));
        let sink = results.clone();
        let send = move |exchange: &MessageExchange, payload: Value, timeout: Option<Duration>| {
            exchange
                .send_and_receive(
                    payload,
                    Box::new(move |result| sink.borrow_mut().push(result)),
                    timeout,
                )
                .unwrap();
        };
        (results, send)
    }

    // ===== Scenario: twined in-process round trip =====

    #[test]
    fn test_twined_ping_pong_resolves_in_one_tick() {
        let rig = Rig::new();
        let client = rig.exchange(ExchangeConfig::default());
        let service = rig.exchange(ExchangeConfig::default());
        client.twine(&service).unwrap();

        let pong: Handler<Inbound> = Rc::new(|inbound: &Inbound| {
            inbound.replier.ok(json!({"op": "pong"}));
        });
        service.dispatch().subscribe(pong).unwrap();

        let (results, send) = recording();
        send(&client, json!({"op": "ping"}), None);

        // No boundary, no timers: the reply is already here.
        assert_eq!(*results.borrow(), vec![Ok(json!({"op": "pong"}))]);
    }

    // ===== Scenario: timeout law with a stray late reply =====

    #[test]
    fn test_timeout_then_stray_reply_invokes_callback_once() {
        let rig = Rig::new();
        let exchange = rig.exchange(
            ExchangeConfig::default().with_sweep_interval(Duration::from_millis(10)),
        );
        let wire_sentinel = Sentinel::new();
        let wire = Channel::new(wire_sentinel.clone());
        exchange.listen(&wire).unwrap();

        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = results.clone();
        let msg_id = exchange
            .send_and_receive(
                json!({"op": "ping"}),
                Box::new(move |result| sink.borrow_mut().push(result)),
                Some(Duration::from_millis(50)),
            )
            .unwrap();

        rig.tick(Duration::from_millis(50));
        assert_eq!(
            *results.borrow(),
            vec![Err(ExchangeError::Timeout {
                timeout: Duration::from_millis(50)
            })]
        );

        // A stray reply for that msgId arrives afterwards and must be
        // dropped, not delivered.
        let stray = Envelope::reply(msg_id, Ok(json!("too late")), rig.clock.now());
        wire.publish(&wire_sentinel, &stray).unwrap();
        assert_eq!(results.borrow().len(), 1);
    }

    // ===== Scenario: request/reply across a boundary =====

    #[test]
    fn test_round_trip_across_port_transport() {
        let rig = Rig::new();
        let (near_ports, far_ports) = PortLink::pair();

        let near_transport = PortTransport::new(
            EndpointId::new("near"),
            Rc::new(PassthroughCodec),
            Logger::disabled(),
        );
        near_transport.bind(near_ports).unwrap();
        let client = rig.exchange(ExchangeConfig::default());
        client.listen(near_transport.dispatch_channel()).unwrap();
        near_transport.forward(client.egress()).unwrap();

        let far_transport = PortTransport::new(
            EndpointId::new("far"),
            Rc::new(PassthroughCodec),
            Logger::disabled(),
        );
        far_transport.bind(far_ports).unwrap();
        let service = rig.exchange(ExchangeConfig::default());
        service.listen(far_transport.dispatch_channel()).unwrap();
        far_transport.forward(service.egress()).unwrap();

        Responder::new(Logger::disabled())
            .with_route("math.double", |body| {
                let n = body.as_i64().ok_or("not a number")?;
                Ok(json!(n * 2))
            })
            .attach(&service)
            .unwrap();

        let (results, send) = recording();
        send(
            &client,
            Request::new("math.double", json!(21)).to_payload().unwrap(),
            None,
        );
        assert_eq!(*results.borrow(), vec![Ok(json!(42))]);
    }

    // ===== Scenario: spawn with a failing sandbox delegate =====

    struct AlwaysRejects {
        destroy_calls: Rc<Cell<usize>>,
    }

    impl SandboxDelegate for AlwaysRejects {
        fn fabricate(&mut self, url: &str) -> Result<SandboxBinding, SandboxError> {
            Err(SandboxError::Fabrication(format!("refusing {url}")))
        }

        fn destroy(&mut self, _handle: SandboxHandle) -> Result<(), SandboxError> {
            self.destroy_calls.set(self.destroy_calls.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_fabrication_failure_yields_zombie_and_no_destroy() {
        let rig = Rig::new();
        let destroy_calls = Rc::new(Cell::new(0));
        let delegate = Rc::new(RefCell::new(AlwaysRejects {
            destroy_calls: destroy_calls.clone(),
        }));
        let transport = Rc::new(PortTransport::new(
            EndpointId::new("near"),
            Rc::new(PassthroughCodec),
            Logger::disabled(),
        ));
        let mut process = RemoteProcess::new(
            ProcessConfig::new("sandbox.html"),
            delegate,
            transport,
            rig.clock.clone(),
            rig.scheduler.clone(),
            Logger::disabled(),
        );

        assert!(process.init().is_err());
        assert_eq!(process.state(), ProcessState::Zombie);
        assert_eq!(destroy_calls.get(), 0, "no sandbox was ever created");
    }

    // ===== Scenario: manager-wide shutdown =====

    /// Fabricates a live far side that acknowledges handshakes.
    struct LoopbackSandbox {
        rig: Rig,
        far_sides: Vec<(Rc<PortTransport>, MessageExchange)>,
    }

    impl SandboxDelegate for LoopbackSandbox {
        fn fabricate(&mut self, _url: &str) -> Result<SandboxBinding, SandboxError> {
            let (near, far) = PortLink::pair();
            let far_transport = Rc::new(PortTransport::new(
                EndpointId::new("far"),
                Rc::new(PassthroughCodec),
                Logger::disabled(),
            ));
            far_transport.bind(far).map_err(|error| {
                SandboxError::Fabrication(error.to_string())
            })?;
            let far_exchange = self.rig.exchange(ExchangeConfig::default());
            far_exchange
                .listen(far_transport.dispatch_channel())
                .map_err(|error| SandboxError::Fabrication(error.to_string()))?;
            far_transport
                .forward(far_exchange.egress())
                .map_err(|error| SandboxError::Fabrication(error.to_string()))?;
            handshake_responder(Logger::disabled())
                .attach(&far_exchange)
                .map_err(|error| SandboxError::Fabrication(error.to_string()))?;
            self.far_sides.push((far_transport, far_exchange));
            Ok(SandboxBinding {
                handle: SandboxHandle::new(),
                ports: near,
            })
        }

        fn destroy(&mut self, _handle: SandboxHandle) -> Result<(), SandboxError> {
            Ok(())
        }
    }

    struct CountingProbe {
        calls: Rc<Cell<usize>>,
    }

    impl HealthCheckDelegate for CountingProbe {
        fn check(&mut self) -> Result<(), String> {
            self.calls.set(self.calls.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_manager_shutdown_tears_down_spawned_process() {
        let rig = Rig::new();
        let manager = ProcessManager::new(
            rig.clock.clone(),
            rig.scheduler.clone(),
            HealthCheckConfig::default(),
            Logger::disabled(),
        );

        let teardown_calls = Rc::new(Cell::new(0));
        let probe_calls = Rc::new(Cell::new(0));
        let pid = manager
            .spawn({
                let rig = Rig {
                    clock: rig.clock.clone(),
                    scheduler: rig.scheduler.clone(),
                };
                let teardown_calls = teardown_calls.clone();
                let probe_calls = probe_calls.clone();
                move || {
                    let delegate = Rc::new(RefCell::new(LoopbackSandbox {
                        rig,
                        far_sides: Vec::new(),
                    }));
                    let transport = Rc::new(PortTransport::new(
                        EndpointId::new("near"),
                        Rc::new(PassthroughCodec),
                        Logger::disabled(),
                    ));
                    let clock = delegate.borrow().rig.clock.clone();
                    let scheduler = delegate.borrow().rig.scheduler.clone();
                    let process = RemoteProcess::new(
                        ProcessConfig::new("sandbox.html").with_handshake(
                            HandshakeConfig::default()
                                .with_attempt_timeout(Duration::from_millis(100)),
                        ),
                        delegate,
                        transport,
                        clock,
                        scheduler,
                        Logger::disabled(),
                    )
                    .with_teardown_hook(Box::new(move || {
                        teardown_calls.set(teardown_calls.get() + 1)
                    }))
                    .with_health_delegate(Rc::new(RefCell::new(CountingProbe {
                        calls: probe_calls.clone(),
                    })));
                    Rc::new(RefCell::new(process))
                }
            })
            .unwrap();

        // The handshake resolves synchronously against the loopback
        // sandbox, so the Pid can message the process right away.
        assert!(pid.send(json!({"op": "warmup"})).is_ok());

        // Health probes run on their cadence until shutdown.
        rig.tick(Duration::from_secs(10));
        assert_eq!(probe_calls.get(), 1);

        let manager_events = Rc::new(RefCell::new(Vec::new()));
        let handler: Handler<ManagerEvent> = {
            let manager_events = manager_events.clone();
            Rc::new(move |event: &ManagerEvent| manager_events.borrow_mut().push(*event))
        };
        manager.events().subscribe(handler).unwrap();

        manager.shutdown();
        manager.shutdown();

        assert_eq!(teardown_calls.get(), 1, "graceful teardown exactly once");
        assert!(pid.is_terminated());
        assert_eq!(pid.send(json!(1)), Err(PidError::Terminated));
        assert_eq!(
            *manager_events.borrow(),
            vec![ManagerEvent::DidShutdown],
            "didShutdown exactly once"
        );

        // The health checker is disposed: probes stop for good.
        rig.tick(Duration::from_secs(30));
        assert_eq!(probe_calls.get(), 1);
    }
}
