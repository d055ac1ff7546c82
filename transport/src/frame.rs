//! Transport frames and serialization strategies

use channels::ChannelError;
use core_types::EndpointId;
use exchange::Envelope;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The boundary-crossing wrapper around an envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportFrame {
    /// Identity of the sending endpoint
    pub sender: EndpointId,
    /// Addressee; `None` means anyone on the far side may take it
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub destination: Option<EndpointId>,
    /// The wrapped envelope
    pub envelope: Envelope,
}

/// What actually crosses the boundary
///
/// Structured frames cross as values (hosts whose boundary accepts
/// objects); text frames cross as a JSON string (legacy hosts that only
/// pass strings).
#[derive(Debug, Clone, PartialEq)]
pub enum WirePayload {
    Structured(TransportFrame),
    Text(String),
}

/// Errors for transport operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Frame failed to encode or decode
    #[error("codec error: {0}")]
    Codec(String),

    /// The transport already has a bound endpoint
    #[error("transport is already bound")]
    AlreadyBound,

    /// An owned or supplied channel rejected the operation
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Serialization strategy for frames crossing the boundary
pub trait FrameCodec {
    fn encode(&self, frame: &TransportFrame) -> Result<WirePayload, TransportError>;
    fn decode(&self, payload: &WirePayload) -> Result<TransportFrame, TransportError>;
}

/// Frames cross the boundary as structured values
#[derive(Debug, Default)]
pub struct PassthroughCodec;

impl FrameCodec for PassthroughCodec {
    fn encode(&self, frame: &TransportFrame) -> Result<WirePayload, TransportError> {
        Ok(WirePayload::Structured(frame.clone()))
    }

    fn decode(&self, payload: &WirePayload) -> Result<TransportFrame, TransportError> {
        match payload {
            WirePayload::Structured(frame) => Ok(frame.clone()),
            WirePayload::Text(_) => Err(TransportError::Codec(
                "expected a structured frame, got text".to_string(),
            )),
        }
    }
}

/// Frames cross the boundary as JSON text (legacy wire compatibility)
#[derive(Debug, Default)]
pub struct JsonCodec;

impl FrameCodec for JsonCodec {
    fn encode(&self, frame: &TransportFrame) -> Result<WirePayload, TransportError> {
        serde_json::to_string(frame)
            .map(WirePayload::Text)
            .map_err(|error| TransportError::Codec(error.to_string()))
    }

    fn decode(&self, payload: &WirePayload) -> Result<TransportFrame, TransportError> {
        match payload {
            WirePayload::Text(text) => serde_json::from_str(text)
                .map_err(|error| TransportError::Codec(error.to_string())),
            WirePayload::Structured(_) => Err(TransportError::Codec(
                "expected a text frame, got a structured value".to_string(),
            )),
        }
    }
}
