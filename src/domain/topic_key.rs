//! Topic key codec.
//!
//! A [`TopicKey`] is the canonical string the server registers and tags
//! events with: the caller's topic name, optionally followed by an
//! `options=<url-encoded JSON>` fragment that scopes the subscription
//! (`products?options=%7B%22query%22...`). Two subscriptions to the same
//! topic with different options are different keys.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RealtimeError;

/// Canonical identifier of a `(topic, options)` subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicKey(String);

impl TopicKey {
    /// Creates a key from a bare topic, without options.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidArgument`] if `topic` is empty.
    pub fn new(topic: &str) -> Result<Self, RealtimeError> {
        Self::build(topic, None)
    }

    /// Builds the key for `topic`, appending the encoded `options` when
    /// given. Joins with `&` if the topic already carries a `?`.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidArgument`] if `topic` is empty or
    /// the options cannot be serialized.
    pub fn build(topic: &str, options: Option<&SubscribeOptions>) -> Result<Self, RealtimeError> {
        if topic.is_empty() {
            return Err(RealtimeError::InvalidArgument(
                "topic must be set".to_string(),
            ));
        }

        let Some(options) = options else {
            return Ok(Self(topic.to_string()));
        };

        let json = serde_json::to_string(options)
            .map_err(|err| RealtimeError::InvalidArgument(format!("options: {err}")))?;
        let separator = if topic.contains('?') { '&' } else { '?' };
        Ok(Self(format!(
            "{topic}{separator}options={}",
            urlencoding::encode(&json)
        )))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the topic name without any options fragment.
    #[must_use]
    pub fn topic_name(&self) -> &str {
        self.0.split_once('?').map_or(self.0.as_str(), |(name, _)| name)
    }

    /// Returns `true` if this key belongs to the `prefix` topic family.
    #[must_use]
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        matches_prefix(&self.0, prefix)
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TopicKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<TopicKey> for String {
    fn from(key: TopicKey) -> Self {
        key.0
    }
}

/// Returns `true` iff `key + "?"` starts with `prefix + "?"`.
///
/// The trailing `?` keeps `"products"` from matching `"products2"` while
/// still matching `"products"` and `"products?options=..."`.
#[must_use]
pub fn matches_prefix(key: &str, prefix: &str) -> bool {
    format!("{key}?").starts_with(&format!("{prefix}?"))
}

/// Per-subscription request overrides sent to the server inside the key.
///
/// Maps are ordered so equal options always encode to the same key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscribeOptions {
    /// Query parameters, e.g. `filter` or `expand`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, serde_json::Value>,
    /// Request headers forwarded with the subscription.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl SubscribeOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Selects which registered keys an unsubscribe removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicFilter {
    /// Every key.
    All,
    /// Exactly one key.
    Exact(TopicKey),
    /// Every key in a topic family, per [`matches_prefix`].
    Family(String),
    /// Every key whose topic name starts with the given namespace,
    /// e.g. `"products/"` for all topics of one collection.
    Namespace(String),
}

impl TopicFilter {
    /// Returns `true` if `key` is selected by this filter.
    #[must_use]
    pub fn matches(&self, key: &TopicKey) -> bool {
        match self {
            Self::All => true,
            Self::Exact(exact) => exact == key,
            Self::Family(prefix) => key.matches_prefix(prefix),
            Self::Namespace(namespace) => key.topic_name().starts_with(namespace.as_str()),
        }
    }
}
