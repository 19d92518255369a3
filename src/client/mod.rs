//! Client layer: connection lifecycle, subscription sync and the public handle.
//!
//! A [`RealtimeClient`] multiplexes any number of topic subscriptions over
//! one event stream. All state lives in a single connection manager task;
//! handles talk to it through a command channel.

pub mod backoff;
mod connection;
pub mod handle;
mod messages;
mod pending;
pub mod status;
pub mod sync;

pub use backoff::ReconnectPolicy;
pub use handle::{RealtimeClient, Subscription};
pub use status::{ConnectionState, ConnectionStatus};
pub use sync::HANDSHAKE_DRIFT_RETRIES;
