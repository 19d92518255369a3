//! Subscription registry: topic key → ordered listeners.
//!
//! [`SubscriptionRegistry`] is owned by the connection manager task and
//! needs no locking. It never holds a key with an empty listener list:
//! every mutation that empties a list deletes the key, so "key present"
//! always means "has listeners".

use std::collections::{BTreeSet, HashMap};

use super::topic_key::{TopicFilter, TopicKey};
use super::{Listener, ListenerId, RealtimeMessage};

/// Registered listeners, grouped by topic key in insertion order.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    topics: HashMap<TopicKey, Vec<(ListenerId, Listener)>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener under `key` and returns the key's listener count.
    pub fn add(&mut self, key: TopicKey, id: ListenerId, listener: Listener) -> usize {
        let listeners = self.topics.entry(key).or_default();
        listeners.push((id, listener));
        listeners.len()
    }

    /// Removes the first entry with `id` under `key`.
    ///
    /// Returns `true` if an entry was removed. Deletes the key when its
    /// last listener goes.
    pub fn remove_listener(&mut self, key: &TopicKey, id: ListenerId) -> bool {
        let Some(listeners) = self.topics.get_mut(key) else {
            return false;
        };
        let Some(pos) = listeners.iter().position(|(entry, _)| *entry == id) else {
            return false;
        };
        listeners.remove(pos);
        if listeners.is_empty() {
            self.topics.remove(key);
        }
        true
    }

    /// Deletes every key selected by `filter`, returning the removed keys.
    pub fn remove_matching(&mut self, filter: &TopicFilter) -> Vec<TopicKey> {
        if let TopicFilter::Exact(key) = filter {
            return self
                .topics
                .remove_entry(key)
                .map(|(key, _)| vec![key])
                .unwrap_or_default();
        }

        let removed: Vec<TopicKey> = self
            .topics
            .keys()
            .filter(|key| filter.matches(key))
            .cloned()
            .collect();
        for key in &removed {
            self.topics.remove(key);
        }
        removed
    }

    /// Returns `true` if `key` has a listener, or with `None`, if any key does.
    #[must_use]
    pub fn has_listeners(&self, key: Option<&TopicKey>) -> bool {
        match key {
            Some(key) => self.topics.contains_key(key),
            None => !self.topics.is_empty(),
        }
    }

    /// Returns the number of listeners under `key`.
    #[must_use]
    pub fn listener_count(&self, key: &str) -> usize {
        self.topics.get(key).map_or(0, Vec::len)
    }

    /// Returns the set of keys with at least one listener.
    #[must_use]
    pub fn active_keys(&self) -> BTreeSet<TopicKey> {
        self.topics.keys().cloned().collect()
    }

    /// Returns the keys selected by `filter`.
    #[must_use]
    pub fn keys_matching(&self, filter: &TopicFilter) -> Vec<TopicKey> {
        self.topics
            .keys()
            .filter(|key| filter.matches(key))
            .cloned()
            .collect()
    }

    /// Invokes every listener registered under exactly `key`, in
    /// registration order. Returns the number of listeners called.
    pub fn dispatch(&self, key: &str, message: &RealtimeMessage) -> usize {
        let Some(listeners) = self.topics.get(key) else {
            return 0;
        };
        for (_, listener) in listeners {
            listener.call(message);
        }
        listeners.len()
    }

    /// Returns the number of active keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Returns `true` if no key has listeners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
