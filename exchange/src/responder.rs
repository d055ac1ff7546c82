//! Typed requests and dispatch-by-action routing
//!
//! Payloads carry an action name plus a body; a [`Responder`] holds a
//! construction-time routing table from action to handler. This replaces
//! any reflection-style lookup of handler methods by name: if an action
//! is not in the table, it does not exist.

use crate::{Inbound, MessageExchange};
use channels::{ChannelError, Handler};
use logging::{LogLevel, Logger};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A typed request payload: an action name and an opaque body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// Action the responder routes on
    pub action: String,
    /// Action-specific body
    #[serde(default)]
    pub body: Value,
}

impl Request {
    /// Creates a request
    pub fn new(action: impl Into<String>, body: Value) -> Self {
        Self {
            action: action.into(),
            body,
        }
    }

    /// Serializes into an envelope payload
    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Parses an envelope payload
    pub fn from_payload(payload: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload.clone())
    }
}

/// Handler for one action: body in, wire-safe result out
pub type RouteFn = Rc<dyn Fn(Value) -> Result<Value, String>>;

/// Routing table attached to an exchange's dispatch channel
///
/// Requests for unknown or malformed actions are answered with an error;
/// fire-and-forget messages that cannot be routed are logged and dropped.
#[derive(Clone)]
pub struct Responder {
    routes: Rc<RefCell<HashMap<String, RouteFn>>>,
    handler: Handler<Inbound>,
}

impl Responder {
    /// Creates an empty responder
    pub fn new(logger: Logger) -> Self {
        let routes: Rc<RefCell<HashMap<String, RouteFn>>> = Rc::new(RefCell::new(HashMap::new()));
        let handler: Handler<Inbound> = {
            let routes = Rc::clone(&routes);
            Rc::new(move |inbound: &Inbound| {
                route_inbound(inbound, &routes, &logger);
            })
        };
        Self { routes, handler }
    }

    /// Registers a handler for an action; replaces any previous one
    pub fn add_route(
        &self,
        action: impl Into<String>,
        handler: impl Fn(Value) -> Result<Value, String> + 'static,
    ) {
        self.routes
            .borrow_mut()
            .insert(action.into(), Rc::new(handler));
    }

    /// Builder form of [`add_route`](Responder::add_route)
    pub fn with_route(
        self,
        action: impl Into<String>,
        handler: impl Fn(Value) -> Result<Value, String> + 'static,
    ) -> Self {
        self.add_route(action, handler);
        self
    }

    /// Subscribes this responder to an exchange's dispatch channel
    pub fn attach(&self, exchange: &MessageExchange) -> Result<(), ChannelError> {
        exchange.dispatch().subscribe(self.handler.clone())
    }

    /// Unsubscribes from an exchange's dispatch channel
    pub fn detach(&self, exchange: &MessageExchange) -> bool {
        exchange.dispatch().unsubscribe(&self.handler)
    }
}

fn route_inbound(
    inbound: &Inbound,
    routes: &Rc<RefCell<HashMap<String, RouteFn>>>,
    logger: &Logger,
) {
    let request = match Request::from_payload(&inbound.envelope.payload) {
        Ok(request) => request,
        Err(error) => {
            if !inbound.replier.err(format!("malformed request: {error}")) {
                logger.warn("malformed fire-and-forget payload dropped");
            }
            return;
        }
    };

    let route = routes.borrow().get(&request.action).cloned();
    match route {
        Some(route) => {
            let result = route(request.body);
            inbound.replier.reply(result);
        }
        None => {
            if !inbound
                .replier
                .err(format!("unknown action: {}", request.action))
            {
                logger.log(
                    logger
                        .entry(LogLevel::Warn, "message for unknown action dropped")
                        .with_field("action", request.action),
                );
            }
        }
    }
}
