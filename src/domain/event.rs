//! Events read from the stream and the messages listeners receive.
//!
//! Every event on the stream is named. The reserved [`CONNECT_EVENT`]
//! name carries the connection identifier in its event id; every other
//! name is a topic key. Both kinds are routed through the same registry,
//! so listeners on the connect topic are ordinary listeners.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Reserved event name the server uses for the connection handshake.
pub const CONNECT_EVENT: &str = "PB_CONNECT";

/// Whether a stream event is the handshake or a topic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The handshake event carrying the connection identifier.
    Connect,
    /// An event for a subscribed topic key.
    Topic,
}

/// A named event as decoded from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEvent {
    /// Event name; a topic key or [`CONNECT_EVENT`].
    pub name: String,
    /// Last event id seen on the stream.
    pub id: String,
    /// Raw event data.
    pub data: String,
}

impl ServerEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(name: impl Into<String>, id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            data: data.into(),
        }
    }

    /// Classifies the event by its name.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        if self.name == CONNECT_EVENT {
            EventKind::Connect
        } else {
            EventKind::Topic
        }
    }
}

/// Message handed to listeners.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeMessage {
    /// Topic key the event was delivered on.
    pub topic: String,
    /// Event data parsed as JSON; an empty object if it was not JSON or
    /// parsed to a falsy value (`null`, `false`, `0`, `""`).
    pub data: serde_json::Value,
    /// Time the client dispatched the event.
    pub received_at: DateTime<Utc>,
}

impl RealtimeMessage {
    /// Builds the listener message for a stream event.
    #[must_use]
    pub fn from_event(event: &ServerEvent) -> Self {
        let data = serde_json::from_str::<serde_json::Value>(&event.data)
            .ok()
            .filter(|value| !is_falsy(value))
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
        Self {
            topic: event.name.clone(),
            data,
            received_at: Utc::now(),
        }
    }
}

fn is_falsy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Bool(b) => !b,
        serde_json::Value::Number(n) => n.as_f64() == Some(0.0),
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => false,
    }
}
