//! # realtime-mux
//!
//! Client-side realtime subscription multiplexer.
//!
//! One long-lived server-sent-events connection carries any number of
//! independently subscribed topics. Callers get a plain per-topic
//! subscribe/unsubscribe interface; the crate handles connecting,
//! reconnecting with backoff, resubmitting the active topic set after a
//! reconnect, and folding concurrent connect requests into one attempt.
//!
//! ## Architecture
//!
//! ```text
//! Callers
//!     │
//!     ├── RealtimeClient / CollectionSubscriptions (client/, service/)
//!     │        │ commands
//!     ├── ConnectionManager task (client/)
//!     │        ├── SubscriptionRegistry (domain/)
//!     │        ├── Synchronizer + PendingConnects + ReconnectPolicy
//!     │        │
//!     ├── EventTransport ──── GET  /api/realtime (SSE)   (transport/)
//!     └── SubmitTransport ─── POST /api/realtime (JSON)  + CancellationBridge
//! ```
//!
//! ## Example
//!
//! ```no_run
//! # async fn run() -> Result<(), realtime_mux::error::RealtimeError> {
//! use realtime_mux::client::RealtimeClient;
//! use realtime_mux::config::RealtimeConfig;
//!
//! let client = RealtimeClient::with_http(RealtimeConfig::from_env()?)?;
//! let sub = client
//!     .subscribe("products/*", |msg| println!("{}: {}", msg.topic, msg.data), None)
//!     .await?;
//! // ...
//! sub.unsubscribe().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod transport;

pub use client::{ConnectionState, ConnectionStatus, RealtimeClient, Subscription};
pub use config::RealtimeConfig;
pub use domain::{RealtimeMessage, SubscribeOptions, TopicKey};
pub use error::RealtimeError;
