//! Messages into the connection manager task.

use tokio::sync::oneshot;

use crate::domain::{Listener, ListenerId, TopicFilter, TopicKey};
use crate::error::RealtimeError;
use crate::transport::EventStream;

/// Reply channel for commands that may fail.
pub(crate) type Reply = oneshot::Sender<Result<(), RealtimeError>>;

/// Commands sent from client handles.
#[derive(Debug)]
pub(crate) enum Command {
    /// Register a listener, connecting or resubmitting as needed.
    Subscribe {
        key: TopicKey,
        id: ListenerId,
        listener: Listener,
        reply: Reply,
    },
    /// Remove exactly one listener.
    RemoveListener {
        key: TopicKey,
        id: ListenerId,
        reply: Reply,
    },
    /// Remove every key selected by the filter.
    Unsubscribe { filter: TopicFilter, reply: Reply },
    /// Ensure a connection exists.
    Connect { reply: Reply },
    /// Fully disconnect, keeping registered listeners.
    Disconnect { reply: oneshot::Sender<()> },
}

/// Why a submit was started, and who is waiting on it.
#[derive(Debug)]
pub(crate) enum SubmitPurpose {
    /// Part of the connect handshake.
    Handshake,
    /// The active key set changed while connected.
    Update(Reply),
}

/// Completions from tasks spawned by the manager.
pub(crate) enum Internal {
    /// The stream open finished for attempt `epoch`.
    Opened {
        epoch: u64,
        result: Result<EventStream, RealtimeError>,
    },
    /// A submit finished for connection `epoch`. `Ok(false)` means aborted.
    Submitted {
        epoch: u64,
        purpose: SubmitPurpose,
        result: Result<bool, RealtimeError>,
    },
}
