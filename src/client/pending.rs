//! Pending-connect coordinator.
//!
//! Callers that need a connection while an attempt is already running
//! join this queue instead of opening a second stream. The queue is
//! settled all at once when the attempt concludes.

use tokio::sync::oneshot;

use crate::error::RealtimeError;

/// Reply channel for one waiting caller.
pub(crate) type ConnectReply = oneshot::Sender<Result<(), RealtimeError>>;

/// Ordered queue of callers waiting on the in-flight connect attempt.
#[derive(Debug, Default)]
pub(crate) struct PendingConnects {
    waiters: Vec<ConnectReply>,
}

impl PendingConnects {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, reply: ConnectReply) {
        self.waiters.push(reply);
    }

    /// Resolves every waiter, returning how many there were.
    pub(crate) fn resolve_all(&mut self) -> usize {
        self.settle(&Ok(()))
    }

    /// Rejects every waiter with `err`, returning how many there were.
    pub(crate) fn reject_all(&mut self, err: &RealtimeError) -> usize {
        self.settle(&Err(err.clone()))
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    fn settle(&mut self, outcome: &Result<(), RealtimeError>) -> usize {
        let waiters = std::mem::take(&mut self.waiters);
        let count = waiters.len();
        for waiter in waiters {
            // The caller may have stopped waiting.
            let _ = waiter.send(outcome.clone());
        }
        count
    }
}
