//! Wire envelopes
//!
//! The envelope is the unit that crosses a boundary. Field and kind
//! spellings on the wire keep the legacy camelCase names so old and new
//! endpoints interoperate; the Rust side uses ordinary snake_case.

use core_types::{Instant, MessageId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What an envelope means to the receiving exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Fire-and-forget payload; no reply expected
    #[serde(rename = "rpcSend")]
    Send,
    /// Request expecting exactly one correlated reply
    #[serde(rename = "rpcSendAndReceive")]
    SendAndReceive,
    /// Reply correlated to an earlier request
    #[serde(rename = "rpcReply")]
    Reply,
    /// Local re-wrap handed to dispatch subscribers; never sent
    #[serde(rename = "localDispatch")]
    LocalDispatch,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Send => write!(f, "rpcSend"),
            MessageKind::SendAndReceive => write!(f, "rpcSendAndReceive"),
            MessageKind::Reply => write!(f, "rpcReply"),
            MessageKind::LocalDispatch => write!(f, "localDispatch"),
        }
    }
}

/// The wire-level message unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique identifier for this envelope
    #[serde(rename = "msgId")]
    pub msg_id: MessageId,
    /// Message kind
    #[serde(rename = "mType")]
    pub kind: MessageKind,
    /// Opaque JSON payload; `Null` for error replies
    pub payload: Value,
    /// Sender-side creation time, nanoseconds on the sender's clock
    #[serde(rename = "timestamp")]
    pub timestamp_nanos: u64,
    /// For replies: the request this correlates to
    #[serde(rename = "rMsgId", skip_serializing_if = "Option::is_none", default)]
    pub reply_to: Option<MessageId>,
    /// For replies: remote failure, coerced to a string for wire-safety
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl Envelope {
    /// Creates a fire-and-forget envelope
    pub fn send(payload: Value, now: Instant) -> Self {
        Self {
            msg_id: MessageId::new(),
            kind: MessageKind::Send,
            payload,
            timestamp_nanos: now.as_nanos(),
            reply_to: None,
            error: None,
        }
    }

    /// Creates a request envelope expecting a reply
    pub fn request(payload: Value, now: Instant) -> Self {
        Self {
            msg_id: MessageId::new(),
            kind: MessageKind::SendAndReceive,
            payload,
            timestamp_nanos: now.as_nanos(),
            reply_to: None,
            error: None,
        }
    }

    /// Creates a reply correlated to `request_id`
    ///
    /// An error result nulls the payload and carries the message in the
    /// `error` field.
    pub fn reply(request_id: MessageId, result: Result<Value, String>, now: Instant) -> Self {
        let (payload, error) = match result {
            Ok(value) => (value, None),
            Err(message) => (Value::Null, Some(message)),
        };
        Self {
            msg_id: MessageId::new(),
            kind: MessageKind::Reply,
            payload,
            timestamp_nanos: now.as_nanos(),
            reply_to: Some(request_id),
            error,
        }
    }

    /// Creates the local re-wrap of an inbound message
    ///
    /// Keeps the original message ID in `reply_to` so local handlers can
    /// see the correlation without understanding the wire kinds.
    pub fn local_dispatch(original: MessageId, payload: Value, now: Instant) -> Self {
        Self {
            msg_id: MessageId::new(),
            kind: MessageKind::LocalDispatch,
            payload,
            timestamp_nanos: now.as_nanos(),
            reply_to: Some(original),
            error: None,
        }
    }

    /// Checks whether this envelope signals a remote failure
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
