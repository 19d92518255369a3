//! Listener callbacks and their identities.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::RealtimeMessage;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one registered listener.
///
/// Every `subscribe` call gets a fresh id, so the same callback registered
/// twice under one key yields two independently removable entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocates the next process-unique id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared callback invoked for every event on its topic key.
///
/// Callbacks run on the connection manager task and must not block.
#[derive(Clone)]
pub struct Listener(Arc<dyn Fn(&RealtimeMessage) + Send + Sync>);

impl Listener {
    /// Wraps a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&RealtimeMessage) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    /// Invokes the callback.
    pub fn call(&self, message: &RealtimeMessage) {
        (self.0)(message);
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").finish_non_exhaustive()
    }
}
