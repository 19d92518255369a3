//! Domain layer: topic keys, listeners, stream events, and the registry.
//!
//! This module contains the client-side subscription model: how topic
//! keys are built and matched, what a listener is, which events arrive on
//! the stream, and the registry that maps keys to listeners.

pub mod event;
pub mod listener;
pub mod registry;
pub mod topic_key;

pub use event::{CONNECT_EVENT, EventKind, RealtimeMessage, ServerEvent};
pub use listener::{Listener, ListenerId};
pub use registry::SubscriptionRegistry;
pub use topic_key::{SubscribeOptions, TopicFilter, TopicKey, matches_prefix};
