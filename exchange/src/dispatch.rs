//! Local dispatch units
//!
//! What local responders see: the re-wrapped envelope plus a single-shot
//! reply handle. The handle is the only way local code can answer a
//! request; how the answer becomes a wire envelope is the exchange's
//! concern.

use crate::Envelope;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

type ReplyFn = Box<dyn FnOnce(Result<Value, String>)>;

/// Single-shot reply handle
///
/// Cloneable so a dispatch unit can fan out to several subscribers, but
/// only the first `reply` wins; later calls are a no-op returning
/// `false`. Fire-and-forget deliveries carry a discard handle that never
/// accepts a reply.
#[derive(Clone)]
pub struct Replier {
    slot: Rc<RefCell<Option<ReplyFn>>>,
}

impl Replier {
    /// Creates a handle that forwards the first reply to `deliver`
    pub(crate) fn new(deliver: ReplyFn) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Some(deliver))),
        }
    }

    /// Creates a handle that accepts no reply (fire-and-forget)
    pub fn discard() -> Self {
        Self {
            slot: Rc::new(RefCell::new(None)),
        }
    }

    /// Delivers the reply; returns whether it was accepted
    pub fn reply(&self, result: Result<Value, String>) -> bool {
        match self.slot.borrow_mut().take() {
            Some(deliver) => {
                deliver(result);
                true
            }
            None => false,
        }
    }

    /// Shorthand for a successful reply
    pub fn ok(&self, value: Value) -> bool {
        self.reply(Ok(value))
    }

    /// Shorthand for an error reply
    pub fn err(&self, message: impl Into<String>) -> bool {
        self.reply(Err(message.into()))
    }

    /// Checks whether a reply can still be delivered
    pub fn is_open(&self) -> bool {
        self.slot.borrow().is_some()
    }
}

impl std::fmt::Debug for Replier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replier")
            .field("open", &self.is_open())
            .finish()
    }
}

/// A message delivered on an exchange's dispatch channel
#[derive(Debug, Clone)]
pub struct Inbound {
    /// The local re-wrap ([`crate::MessageKind::LocalDispatch`])
    pub envelope: Envelope,
    /// Reply handle; discard for fire-and-forget messages
    pub replier: Replier,
}
