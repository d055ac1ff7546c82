//! Sandbox fabrication delegate

use core_types::SandboxHandle;
use thiserror::Error;
use transport::Endpoint;

/// Errors reported by a sandbox delegate
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SandboxError {
    /// The execution context could not be created
    #[error("sandbox fabrication failed: {0}")]
    Fabrication(String),

    /// The execution context could not be torn down
    #[error("sandbox teardown failed: {0}")]
    Teardown(String),
}

/// A freshly fabricated sandbox: its handle and its bindable surface
pub struct SandboxBinding {
    /// Handle required for later teardown
    pub handle: SandboxHandle,
    /// Boundary ports a transport can bind to
    pub ports: Endpoint,
}

/// Creates and destroys isolated execution contexts
///
/// What a sandbox actually is (iframe, worker, subprocess) is the host's
/// business; this core only ever sees the handle and the ports. A failed
/// `fabricate` means no sandbox exists, so `destroy` must not be called
/// for it.
pub trait SandboxDelegate {
    fn fabricate(&mut self, url: &str) -> Result<SandboxBinding, SandboxError>;
    fn destroy(&mut self, handle: SandboxHandle) -> Result<(), SandboxError>;
}
