//! Public client handle and per-listener subscription handles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};

use super::connection::ConnectionManager;
use super::messages::Command;
use super::status::ConnectionStatus;
use crate::config::RealtimeConfig;
use crate::domain::{
    Listener, ListenerId, RealtimeMessage, SubscribeOptions, TopicFilter, TopicKey,
};
use crate::error::RealtimeError;
use crate::service::CollectionSubscriptions;
use crate::transport::{EventTransport, HttpTransport, SubmitTransport};

/// Handle to a realtime connection manager.
///
/// Cheap to clone. The manager task keeps running while any client or
/// [`Subscription`] handle is alive and fully disconnects once the last
/// one is dropped.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ConnectionStatus>,
}

impl RealtimeClient {
    /// Spawns a connection manager using the given transports.
    ///
    /// Must be called from within a Tokio runtime. No connection is opened
    /// until the first subscribe or [`RealtimeClient::connect`].
    #[must_use]
    pub fn new(
        config: RealtimeConfig,
        events: Arc<dyn EventTransport>,
        requests: Arc<dyn SubmitTransport>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer.max(1));
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let manager = ConnectionManager::new(config, events, requests, commands_rx, status_tx);
        tokio::spawn(manager.run());
        Self {
            commands: commands_tx,
            status: status_rx,
        }
    }

    /// Spawns a connection manager talking HTTP to `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] if the base URL is invalid.
    pub fn with_http(config: RealtimeConfig) -> Result<Self, RealtimeError> {
        let transport = Arc::new(HttpTransport::new(&config.base_url)?);
        Ok(Self::new(config, Arc::clone(&transport) as Arc<dyn EventTransport>, transport))
    }

    /// Registers `callback` for `topic` (scoped by `options`), connecting
    /// and resubmitting the active topic set as needed.
    ///
    /// Resolves once the listener is live on the server side. On error the
    /// listener is removed again before returning.
    ///
    /// # Errors
    ///
    /// - [`RealtimeError::InvalidArgument`] if `topic` is empty.
    /// - [`RealtimeError::TransportOpen`] or [`RealtimeError::HandshakeTimeout`]
    ///   if the connection could not be established.
    /// - [`RealtimeError::SubmitFailed`] if the server rejected the new set.
    /// - [`RealtimeError::ClientClosed`] if the manager is gone.
    pub async fn subscribe<F>(
        &self,
        topic: &str,
        callback: F,
        options: Option<SubscribeOptions>,
    ) -> Result<Subscription, RealtimeError>
    where
        F: Fn(&RealtimeMessage) + Send + Sync + 'static,
    {
        let key = TopicKey::build(topic, options.as_ref())?;
        let id = ListenerId::next();
        let subscription = Subscription {
            key: key.clone(),
            id,
            commands: self.commands.clone(),
            active: Arc::new(AtomicBool::new(true)),
        };

        // Dropping this future before the reply arrives must not leak the listener.
        let guard = DetachOnDrop(Some(&subscription));
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe {
            key,
            id,
            listener: Listener::new(callback),
            reply,
        })
        .await?;
        let outcome = rx.await.map_err(|_| RealtimeError::ClientClosed)?;
        guard.disarm();

        match outcome {
            Ok(()) => Ok(subscription),
            Err(err) => {
                let _ = subscription.unsubscribe().await;
                Err(err)
            }
        }
    }

    /// Removes every listener under exactly `topic`, or with `None`, all
    /// listeners. Closes the connection if nothing remains.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidArgument`] for an empty topic,
    /// [`RealtimeError::SubmitFailed`] if resubmitting the remaining set
    /// failed, or [`RealtimeError::ClientClosed`] if the manager is gone.
    pub async fn unsubscribe(&self, topic: Option<&str>) -> Result<(), RealtimeError> {
        let filter = match topic {
            Some(topic) => TopicFilter::Exact(TopicKey::new(topic)?),
            None => TopicFilter::All,
        };
        self.unsubscribe_matching(filter).await
    }

    /// Removes every key in the `prefix` topic family: `"products"`
    /// removes `"products"` and `"products?options=..."` but not
    /// `"products2"`.
    ///
    /// # Errors
    ///
    /// See [`RealtimeClient::unsubscribe`].
    pub async fn unsubscribe_by_prefix(&self, prefix: &str) -> Result<(), RealtimeError> {
        self.unsubscribe_matching(TopicFilter::Family(prefix.to_string()))
            .await
    }

    /// Removes every key selected by `filter`.
    ///
    /// # Errors
    ///
    /// See [`RealtimeClient::unsubscribe`].
    pub async fn unsubscribe_matching(&self, filter: TopicFilter) -> Result<(), RealtimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Unsubscribe { filter, reply }).await?;
        rx.await.map_err(|_| RealtimeError::ClientClosed)?
    }

    /// Ensures a connection exists, joining an attempt already in flight.
    ///
    /// # Errors
    ///
    /// Returns the connection failure once the reconnect ceiling is hit,
    /// or [`RealtimeError::ClientClosed`] if the manager is gone.
    pub async fn connect(&self) -> Result<(), RealtimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect { reply }).await?;
        rx.await.map_err(|_| RealtimeError::ClientClosed)?
    }

    /// Closes the connection and resolves pending connects. Listeners stay
    /// registered and are resubmitted on the next connect.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::ClientClosed`] if the manager is gone.
    pub async fn disconnect(&self) -> Result<(), RealtimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Disconnect { reply }).await?;
        rx.await.map_err(|_| RealtimeError::ClientClosed)
    }

    /// Returns `true` if the stream is open, an identifier was received and
    /// no connect attempt is queued.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected
    }

    /// Returns the latest connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Returns a receiver that observes every status change.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Returns subscriptions scoped to one record collection.
    #[must_use]
    pub fn collection(&self, name: &str) -> CollectionSubscriptions {
        CollectionSubscriptions::new(self.clone(), name)
    }

    async fn send(&self, command: Command) -> Result<(), RealtimeError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RealtimeError::ClientClosed)
    }
}

/// Handle to exactly one registered listener.
#[derive(Debug, Clone)]
pub struct Subscription {
    key: TopicKey,
    id: ListenerId,
    commands: mpsc::Sender<Command>,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Returns the topic key the listener is registered under.
    #[must_use]
    pub fn key(&self) -> &TopicKey {
        &self.key
    }

    /// Returns the listener's id.
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Returns `false` once [`Subscription::unsubscribe`] has been called.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Removes this listener. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::SubmitFailed`] if resubmitting the remaining
    /// set failed, or [`RealtimeError::ClientClosed`] if the manager is gone.
    pub async fn unsubscribe(&self) -> Result<(), RealtimeError> {
        if !self.active.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::RemoveListener {
                key: self.key.clone(),
                id: self.id,
                reply,
            })
            .await
            .map_err(|_| RealtimeError::ClientClosed)?;
        rx.await.map_err(|_| RealtimeError::ClientClosed)?
    }

    /// Queues removal of this listener without waiting for the outcome.
    fn detach(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let (reply, _) = oneshot::channel();
        let command = Command::RemoveListener {
            key: self.key.clone(),
            id: self.id,
            reply,
        };
        match self.commands.try_send(command) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(command)) => {
                let Ok(runtime) = Handle::try_current() else {
                    return;
                };
                let commands = self.commands.clone();
                runtime.spawn(async move {
                    let _ = commands.send(command).await;
                });
            }
        }
    }
}

/// Detaches a listener whose `subscribe` call never completed.
#[derive(Debug)]
struct DetachOnDrop<'a>(Option<&'a Subscription>);

impl DetachOnDrop<'_> {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for DetachOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(subscription) = self.0 {
            tracing::debug!(
                topic = %subscription.key,
                listener = %subscription.id,
                "subscribe abandoned, detaching listener"
            );
            subscription.detach();
        }
    }
}
