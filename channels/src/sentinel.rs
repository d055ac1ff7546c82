//! Publish-authorization tokens

use std::fmt;
use std::rc::Rc;

/// An unforgeable publish-authorization token
///
/// A channel remembers the sentinel it was created with; every publish
/// must present a clone of that sentinel. Equality is pointer identity
/// on a private allocation, so no amount of constructing new sentinels
/// produces one that matches an existing channel.
#[derive(Clone)]
pub struct Sentinel {
    token: Rc<()>,
}

impl Sentinel {
    /// Creates a fresh sentinel, matching only its own clones
    pub fn new() -> Self {
        Self { token: Rc::new(()) }
    }

    /// Checks whether two sentinels are clones of the same token
    pub fn matches(&self, other: &Sentinel) -> bool {
        Rc::ptr_eq(&self.token, &other.token)
    }
}

impl Default for Sentinel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sentinel({:p})", Rc::as_ptr(&self.token))
    }
}
