//! Handshake protocol pieces

use core_types::Duration;
use exchange::Responder;
use logging::Logger;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Action of the greeting request a spawning process sends
pub const HANDSHAKE_ACTION: &str = "process.handshake.hello";

/// Tunables for the handshake protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Reply window for a single greeting attempt
    pub attempt_timeout: Duration,
    /// Attempts before the process is declared unreachable
    pub max_attempts: u32,
}

impl HandshakeConfig {
    /// Sets the per-attempt reply window
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Sets the attempt budget
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_millis(500),
            max_attempts: 5,
        }
    }
}

/// A responder that acknowledges greetings
///
/// The remote side of a sandbox attaches this (or routes the action into
/// its own table) so a spawning process can complete its handshake.
pub fn handshake_responder(logger: Logger) -> Responder {
    Responder::new(logger).with_route(HANDSHAKE_ACTION, |_| Ok(json!({ "status": "ack" })))
}
