//! Transport seams: the event stream and the subscription submit.
//!
//! The connection manager only talks to the network through
//! [`EventTransport`] and [`SubmitTransport`]. [`HttpTransport`] implements
//! both over HTTP with server-sent events; tests plug in scripted ones.

pub mod cancel;
pub mod http;
pub mod sse;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::Serialize;

use crate::domain::ServerEvent;
use crate::error::RealtimeError;

pub use cancel::CancellationBridge;
pub use http::HttpTransport;
pub use sse::{SseDecoder, decode_event_stream};

/// Stream of named events from an open connection.
///
/// An `Err` item or the end of the stream means the connection dropped.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ServerEvent, RealtimeError>> + Send>>;

/// Opens the long-lived event stream.
#[async_trait]
pub trait EventTransport: Send + Sync + fmt::Debug {
    /// Opens a new stream against `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::TransportOpen`] if the stream cannot be
    /// established.
    async fn open(&self, path: &str) -> Result<EventStream, RealtimeError>;
}

/// Sends the active subscription set to the server.
#[async_trait]
pub trait SubmitTransport: Send + Sync + fmt::Debug {
    /// Submits `payload` to `path`. Cancellation is applied by dropping
    /// the returned future.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::SubmitFailed`] if the server rejects the
    /// request or it cannot be sent.
    async fn submit(&self, path: &str, payload: &SubscriptionPayload) -> Result<(), RealtimeError>;
}

/// Body of a subscription submit: the full set of active topic keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPayload {
    /// Server-issued identifier of the current connection.
    pub connection_id: String,
    /// Active topic keys, without duplicates.
    pub subscriptions: Vec<String>,
}
