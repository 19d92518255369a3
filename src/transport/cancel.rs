//! Request cancellation bridge.
//!
//! Outbound requests are tagged with a string key. Starting a new request
//! under a key cancels the one already in flight under it, and
//! [`CancellationBridge::cancel`] aborts whatever is outstanding for a key.
//! A cancelled request resolves to [`RealtimeError::SubmitAborted`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::error::RealtimeError;

#[derive(Debug)]
struct Tracked {
    ticket: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct Inflight {
    next_ticket: u64,
    requests: HashMap<String, Tracked>,
}

/// Keyed cancellation of outstanding requests.
///
/// Cheap to clone; clones share the same set of in-flight requests.
#[derive(Debug, Clone, Default)]
pub struct CancellationBridge {
    inflight: Arc<Mutex<Inflight>>,
}

impl CancellationBridge {
    /// Creates an empty bridge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `request` under `key`, cancelling any request already running
    /// under the same key.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::SubmitAborted`] if the request is cancelled
    /// before it completes, otherwise whatever `request` returns.
    pub async fn run<F, T>(&self, key: &str, request: F) -> Result<T, RealtimeError>
    where
        F: Future<Output = Result<T, RealtimeError>>,
    {
        let (ticket, token) = self.track(key);
        let result = tokio::select! {
            () = token.cancelled() => Err(RealtimeError::SubmitAborted),
            result = request => result,
        };
        self.release(key, ticket);
        result
    }

    /// Cancels the request outstanding under `key`, if any.
    ///
    /// Returns `true` if a request was cancelled.
    pub fn cancel(&self, key: &str) -> bool {
        let removed = self.lock().requests.remove(key);
        match removed {
            Some(tracked) => {
                tracked.token.cancel();
                tracing::debug!(key, "cancelled in-flight request");
                true
            }
            None => false,
        }
    }

    /// Cancels every outstanding request.
    pub fn cancel_all(&self) {
        let drained: Vec<Tracked> = self.lock().requests.drain().map(|(_, t)| t).collect();
        for tracked in drained {
            tracked.token.cancel();
        }
    }

    /// Returns the number of requests currently tracked.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().requests.len()
    }

    fn track(&self, key: &str) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let mut inflight = self.lock();
        inflight.next_ticket = inflight.next_ticket.wrapping_add(1);
        let ticket = inflight.next_ticket;
        let previous = inflight.requests.insert(
            key.to_string(),
            Tracked {
                ticket,
                token: token.clone(),
            },
        );
        drop(inflight);

        if let Some(previous) = previous {
            tracing::debug!(key, "superseding in-flight request");
            previous.token.cancel();
        }
        (ticket, token)
    }

    fn release(&self, key: &str, ticket: u64) {
        let mut inflight = self.lock();
        if inflight
            .requests
            .get(key)
            .is_some_and(|tracked| tracked.ticket == ticket)
        {
            inflight.requests.remove(key);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inflight> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
