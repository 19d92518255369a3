//! Collection-scoped subscriptions.
//!
//! Record collections publish on topics named `"<collection>/<topic>"`,
//! where `<topic>` is `"*"` for every record or a single record id.

use crate::client::{RealtimeClient, Subscription};
use crate::domain::{RealtimeMessage, SubscribeOptions, TopicFilter};
use crate::error::RealtimeError;

/// Subscriptions to the record topics of one collection.
#[derive(Debug, Clone)]
pub struct CollectionSubscriptions {
    client: RealtimeClient,
    collection: String,
}

impl CollectionSubscriptions {
    /// Creates a scope for `collection` (id or name).
    #[must_use]
    pub fn new(client: RealtimeClient, collection: &str) -> Self {
        Self {
            client,
            collection: collection.to_string(),
        }
    }

    /// Returns the collection id or name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Subscribes to `topic` (`"*"` or a record id) in this collection.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidArgument`] if the collection or
    /// `topic` is empty, otherwise see [`RealtimeClient::subscribe`].
    pub async fn subscribe<F>(
        &self,
        topic: &str,
        callback: F,
        options: Option<SubscribeOptions>,
    ) -> Result<Subscription, RealtimeError>
    where
        F: Fn(&RealtimeMessage) + Send + Sync + 'static,
    {
        let topic = self.scoped(topic)?;
        self.client.subscribe(&topic, callback, options).await
    }

    /// Removes `topic` with every options variant, or with `None`, every
    /// topic of the collection.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidArgument`] if the collection or
    /// `topic` is empty, otherwise see [`RealtimeClient::unsubscribe`].
    pub async fn unsubscribe(&self, topic: Option<&str>) -> Result<(), RealtimeError> {
        match topic {
            Some(topic) => {
                let topic = self.scoped(topic)?;
                self.client.unsubscribe_by_prefix(&topic).await
            }
            None => {
                self.scoped("*")?;
                let namespace = format!("{}/", self.collection);
                self.client
                    .unsubscribe_matching(TopicFilter::Namespace(namespace))
                    .await
            }
        }
    }

    fn scoped(&self, topic: &str) -> Result<String, RealtimeError> {
        if self.collection.is_empty() {
            return Err(RealtimeError::InvalidArgument(
                "missing collection".to_string(),
            ));
        }
        if topic.is_empty() {
            return Err(RealtimeError::InvalidArgument("missing topic".to_string()));
        }
        Ok(format!("{}/{topic}", self.collection))
    }
}
