//! Subscription synchronizer.
//!
//! Pushes the full set of active topic keys to the server as one
//! idempotent submit, remembering what was last sent so that drift
//! (listeners changed while a submit was in flight) can be detected and
//! corrected during the connect handshake.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::domain::{SubscriptionRegistry, TopicKey};
use crate::error::RealtimeError;
use crate::transport::{CancellationBridge, SubmitTransport, SubscriptionPayload};

/// Extra submits allowed during one connect handshake when the active key
/// set keeps changing underneath it. Past this the handshake completes
/// with whatever was last sent.
pub const HANDSHAKE_DRIFT_RETRIES: u32 = 3;

/// Cancellation key for submits tied to `connection_id`.
#[must_use]
pub fn cancel_key(connection_id: &str) -> String {
    format!("realtime_{connection_id}")
}

/// Tracks the last submitted key set.
#[derive(Debug, Default)]
pub(crate) struct Synchronizer {
    last_sent: BTreeSet<TopicKey>,
}

impl Synchronizer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Snapshots the active keys as last sent and builds the payload.
    ///
    /// Returns `None` when there is no connection to submit for.
    pub(crate) fn prepare(
        &mut self,
        connection_id: &str,
        registry: &SubscriptionRegistry,
    ) -> Option<SubscriptionPayload> {
        if connection_id.is_empty() {
            return None;
        }
        self.last_sent = registry.active_keys();
        Some(SubscriptionPayload {
            connection_id: connection_id.to_string(),
            subscriptions: self.last_sent.iter().map(|k| k.to_string()).collect(),
        })
    }

    /// Returns `true` if the active keys differ from the last submit.
    pub(crate) fn has_drift(&self, registry: &SubscriptionRegistry) -> bool {
        registry.active_keys() != self.last_sent
    }

    pub(crate) fn last_sent(&self) -> &BTreeSet<TopicKey> {
        &self.last_sent
    }
}

/// Sends `payload` under the connection's cancellation key.
///
/// An abort is reported as `Ok(false)`; `Ok(true)` means the server
/// accepted the set.
pub(crate) async fn submit(
    requests: Arc<dyn SubmitTransport>,
    bridge: CancellationBridge,
    path: String,
    payload: SubscriptionPayload,
) -> Result<bool, RealtimeError> {
    let key = cancel_key(&payload.connection_id);
    match bridge.run(&key, requests.submit(&path, &payload)).await {
        Ok(()) => Ok(true),
        Err(err) if err.is_abort() => {
            tracing::debug!(%key, "subscription submit cancelled");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}
