//! Observable connection status.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of the connection manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    #[default]
    Idle,
    /// Stream opening or handshake not yet complete.
    Connecting,
    /// Handshake complete; events are being dispatched.
    Connected,
    /// Stream dropped; waiting out a backoff delay.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// Snapshot published by the manager after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Server-issued connection identifier; empty when not connected.
    pub connection_id: String,
    /// Stream open, identifier received and no connect attempt queued.
    pub connected: bool,
    /// Reconnect attempts made since the last successful connect.
    pub reconnect_attempts: u32,
}
