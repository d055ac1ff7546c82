//! Process lifecycle states and events

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a remote process
///
/// Transitions are validated: a process can only move forward through
/// the machine, and nothing leaves `Zombie` or `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    /// Created; sandbox not yet fabricated
    Initializing,
    /// Sandbox up, transport bound, greeting attempts in flight
    Handshaking,
    /// Handshake acknowledged; operational exchange live
    Running,
    /// Failed; sandbox torn down, unusable
    Zombie,
    /// Shut down deliberately
    Terminated,
}

impl ProcessState {
    /// Checks whether this state can move to `next`
    pub fn can_transition_to(&self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Initializing, Handshaking)
                | (Initializing, Zombie)
                | (Initializing, Terminated)
                | (Handshaking, Running)
                | (Handshaking, Zombie)
                | (Handshaking, Terminated)
                | (Running, Zombie)
                | (Running, Terminated)
        )
    }

    /// Checks whether this is a state with no way out
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Zombie | ProcessState::Terminated)
    }

    /// Checks whether the operational exchange is available
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Initializing => write!(f, "Initializing"),
            ProcessState::Handshaking => write!(f, "Handshaking"),
            ProcessState::Running => write!(f, "Running"),
            ProcessState::Zombie => write!(f, "Zombie"),
            ProcessState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Events a process publishes on its event channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Handshake completed; the operational exchange is live
    Ready,
    /// The process became a zombie
    Failed { reason: String },
    /// The process was shut down deliberately
    TornDown,
}
