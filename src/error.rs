//! Client error types with stable numeric codes.
//!
//! [`RealtimeError`] is the central error type for the crate. Connection
//! lifecycle failures are recovered locally with backoff and only reach
//! callers once the reconnect ceiling is exhausted; submit aborts are
//! swallowed by the connection manager and never surface.

use std::time::Duration;

/// Realtime client error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category          |
/// |-----------|-------------------|
/// | 1000–1999 | Caller input      |
/// | 2000–2999 | Connection        |
/// | 3000–3999 | Subscription sync |
/// | 4000–4999 | Client lifecycle  |
///
/// The enum is `Clone` so that a single connection failure can be handed
/// to every caller waiting on the same connect attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeError {
    /// Empty topic name or otherwise unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration value could not be used.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The event stream failed to open, errored, or was closed.
    #[error("failed to establish realtime connection: {0}")]
    TransportOpen(String),

    /// No connect event arrived within the handshake window.
    #[error("realtime connect took longer than {} ms", .0.as_millis())]
    HandshakeTimeout(Duration),

    /// The subscription submit was superseded or its connection torn down.
    #[error("subscription submit was cancelled")]
    SubmitAborted,

    /// The server rejected the subscription submit, or the request failed.
    #[error("subscription submit failed (status {status:?}): {message}")]
    SubmitFailed {
        /// HTTP status returned by the server, if a response was received.
        status: Option<u16>,
        /// Response body or transport error description.
        message: String,
    },

    /// The connection manager task is no longer running.
    #[error("realtime client has shut down")]
    ClientClosed,
}

impl RealtimeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidArgument(_) => 1001,
            Self::Config(_) => 1002,
            Self::TransportOpen(_) => 2001,
            Self::HandshakeTimeout(_) => 2002,
            Self::SubmitAborted => 3001,
            Self::SubmitFailed { .. } => 3002,
            Self::ClientClosed => 4001,
        }
    }

    /// Returns `true` for a cancelled submit, which callers never see.
    #[must_use]
    pub const fn is_abort(&self) -> bool {
        matches!(self, Self::SubmitAborted)
    }

    /// Returns `true` for failures that feed the reconnect state machine.
    #[must_use]
    pub const fn is_connection_failure(&self) -> bool {
        matches!(self, Self::TransportOpen(_) | Self::HandshakeTimeout(_))
    }
}
