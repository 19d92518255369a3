//! Connection manager state machine.
//!
//! [`ConnectionManager`] runs as a single task that exclusively owns the
//! event stream, the subscription registry and the pending-connect queue.
//! Every transition happens in reaction to one of:
//!
//! - a command from a client handle
//! - a completion from a spawned stream-open or submit task
//! - an item (or the end) of the event stream
//! - the handshake deadline or the reconnect timer
//!
//! ```text
//! Idle ──subscribe──▶ Connecting ──connect event──▶ Handshaking ──submit(s)──▶ Connected
//!  ▲                     │  ▲                            │                         │
//!  │        give up      │  └──── timer ── Reconnecting ◀┴──── error / timeout ───┘
//!  └─────────────────────┘
//! ```
//!
//! Stream opens and submits run as spawned tasks tagged with the current
//! epoch, so dispatch never waits on them. Tearing a connection down bumps
//! the epoch; completions from an older epoch are ignored.

use std::future;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::messages::{Command, Internal, Reply, SubmitPurpose};
use super::pending::PendingConnects;
use super::status::{ConnectionState, ConnectionStatus};
use super::sync::{self, HANDSHAKE_DRIFT_RETRIES, Synchronizer, cancel_key};
use crate::config::RealtimeConfig;
use crate::domain::{
    CONNECT_EVENT, EventKind, Listener, ListenerId, RealtimeMessage, ServerEvent,
    SubscriptionRegistry, TopicFilter, TopicKey,
};
use crate::error::RealtimeError;
use crate::transport::{CancellationBridge, EventStream, EventTransport, SubmitTransport};

/// Internal lifecycle phase. `Handshaking` is reported as `Connecting`.
#[derive(Debug)]
enum Phase {
    Idle,
    Connecting,
    Handshaking {
        retries_left: u32,
        connect_event: ServerEvent,
    },
    Connected,
    Reconnecting,
}

impl Phase {
    const fn state(&self) -> ConnectionState {
        match self {
            Self::Idle => ConnectionState::Idle,
            Self::Connecting | Self::Handshaking { .. } => ConnectionState::Connecting,
            Self::Connected => ConnectionState::Connected,
            Self::Reconnecting => ConnectionState::Reconnecting,
        }
    }
}

/// Owner of the single realtime connection.
pub(crate) struct ConnectionManager {
    config: RealtimeConfig,
    events: Arc<dyn EventTransport>,
    requests: Arc<dyn SubmitTransport>,
    bridge: CancellationBridge,

    registry: SubscriptionRegistry,
    sync: Synchronizer,
    pending: PendingConnects,

    phase: Phase,
    connection_id: String,
    stream: Option<EventStream>,
    open_task: Option<JoinHandle<()>>,
    connect_deadline: Option<Instant>,
    reconnect_at: Option<Instant>,
    attempts: u32,
    epoch: u64,

    commands: mpsc::Receiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    status: watch::Sender<ConnectionStatus>,
}

impl ConnectionManager {
    pub(crate) fn new(
        config: RealtimeConfig,
        events: Arc<dyn EventTransport>,
        requests: Arc<dyn SubmitTransport>,
        commands: mpsc::Receiver<Command>,
        status: watch::Sender<ConnectionStatus>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            config,
            events,
            requests,
            bridge: CancellationBridge::new(),
            registry: SubscriptionRegistry::new(),
            sync: Synchronizer::new(),
            pending: PendingConnects::new(),
            phase: Phase::Idle,
            connection_id: String::new(),
            stream: None,
            open_task: None,
            connect_deadline: None,
            reconnect_at: None,
            attempts: 0,
            epoch: 0,
            commands,
            internal_tx,
            internal_rx,
            status,
        }
    }

    /// Runs until every client handle is dropped, then fully disconnects.
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    self.handle_command(command);
                }
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
                item = next_event(&mut self.stream) => self.handle_stream_item(item),
                () = sleep_until(self.connect_deadline) => {
                    let timeout = self.config.connect_timeout;
                    self.connect_error(RealtimeError::HandshakeTimeout(timeout));
                }
                () = sleep_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.init_connect();
                }
            }
        }

        self.disconnect(false);
        tracing::debug!("realtime connection manager stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe {
                key,
                id,
                listener,
                reply,
            } => self.subscribe(key, id, listener, reply),
            Command::RemoveListener { key, id, reply } => self.remove_listener(&key, id, reply),
            Command::Unsubscribe { filter, reply } => self.unsubscribe(&filter, reply),
            Command::Connect { reply } => self.connect(reply),
            Command::Disconnect { reply } => {
                self.disconnect(false);
                let _ = reply.send(());
            }
        }
    }

    fn subscribe(&mut self, key: TopicKey, id: ListenerId, listener: Listener, reply: Reply) {
        let count = self.registry.add(key.clone(), id, listener);
        tracing::debug!(topic = %key, listener = %id, listeners = count, "listener added");

        if !matches!(self.phase, Phase::Connected) {
            self.connect(reply);
        } else if count == 1 {
            // A new key changes the server-side set.
            self.start_submit(SubmitPurpose::Update(reply));
        } else {
            let _ = reply.send(Ok(()));
        }
    }

    fn remove_listener(&mut self, key: &TopicKey, id: ListenerId, reply: Reply) {
        if !self.registry.remove_listener(key, id) {
            let _ = reply.send(Ok(()));
            return;
        }
        let emptied = !self.registry.has_listeners(Some(key));
        tracing::debug!(topic = %key, listener = %id, emptied, "listener removed");
        self.after_removal(emptied, reply);
    }

    fn unsubscribe(&mut self, filter: &TopicFilter, reply: Reply) {
        let removed = self.registry.remove_matching(filter);
        tracing::debug!(?filter, removed = removed.len(), "topics unsubscribed");
        self.after_removal(!removed.is_empty(), reply);
    }

    fn after_removal(&mut self, keys_changed: bool, reply: Reply) {
        if !self.registry.has_listeners(None) {
            self.disconnect(false);
            let _ = reply.send(Ok(()));
        } else if keys_changed && matches!(self.phase, Phase::Connected) {
            self.start_submit(SubmitPurpose::Update(reply));
        } else {
            let _ = reply.send(Ok(()));
        }
    }

    fn connect(&mut self, reply: Reply) {
        if matches!(self.phase, Phase::Connected) {
            let _ = reply.send(Ok(()));
            return;
        }

        self.pending.push(reply);
        if matches!(self.phase, Phase::Idle) {
            self.init_connect();
        } else {
            tracing::debug!(
                waiting = self.pending.len(),
                "joined in-flight connect attempt"
            );
            self.publish_status();
        }
    }

    /// Opens a fresh stream, keeping the pending queue and attempt count.
    fn init_connect(&mut self) {
        self.disconnect(true);
        self.phase = Phase::Connecting;
        self.connect_deadline = Some(Instant::now() + self.config.connect_timeout);

        let events = Arc::clone(&self.events);
        let path = self.config.realtime_path.clone();
        let tx = self.internal_tx.clone();
        let epoch = self.epoch;
        self.open_task = Some(tokio::spawn(async move {
            let result = events.open(&path).await;
            let _ = tx.send(Internal::Opened { epoch, result });
        }));

        tracing::debug!(attempt = self.attempts, "opening realtime stream");
        self.publish_status();
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Opened { epoch, result } => {
                if epoch != self.epoch {
                    return;
                }
                self.open_task = None;
                match result {
                    Ok(stream) => {
                        tracing::debug!("realtime stream open, awaiting connect event");
                        self.stream = Some(stream);
                    }
                    Err(err) => self.connect_error(err),
                }
            }
            Internal::Submitted {
                epoch,
                purpose,
                result,
            } => self.submit_finished(epoch, purpose, result),
        }
    }

    fn handle_stream_item(&mut self, item: Option<Result<ServerEvent, RealtimeError>>) {
        match item {
            Some(Ok(event)) => match event.kind() {
                EventKind::Connect => self.on_connect_event(event),
                EventKind::Topic => self.dispatch(&event),
            },
            Some(Err(err)) => {
                tracing::warn!(%err, "realtime stream errored");
                self.connect_error(err);
            }
            None => self.connect_error(RealtimeError::TransportOpen(
                "event stream closed by server".to_string(),
            )),
        }
    }

    fn on_connect_event(&mut self, event: ServerEvent) {
        if event.id.is_empty() {
            self.connect_error(RealtimeError::TransportOpen(
                "connect event carried no connection id".to_string(),
            ));
            return;
        }

        self.connection_id.clone_from(&event.id);
        tracing::debug!(connection_id = %self.connection_id, "connect event received");
        self.phase = Phase::Handshaking {
            retries_left: HANDSHAKE_DRIFT_RETRIES,
            connect_event: event,
        };
        self.start_submit(SubmitPurpose::Handshake);
        self.publish_status();
    }

    fn dispatch(&self, event: &ServerEvent) {
        if self.connection_id.is_empty() {
            return;
        }
        let message = RealtimeMessage::from_event(event);
        let delivered = self.registry.dispatch(&event.name, &message);
        tracing::trace!(topic = %event.name, delivered, "event dispatched");
    }

    fn start_submit(&mut self, purpose: SubmitPurpose) {
        let Some(payload) = self.sync.prepare(&self.connection_id, &self.registry) else {
            if let SubmitPurpose::Update(reply) = purpose {
                let _ = reply.send(Ok(()));
            }
            return;
        };
        tracing::debug!(
            connection_id = %payload.connection_id,
            topics = self.sync.last_sent().len(),
            "submitting subscriptions"
        );

        let requests = Arc::clone(&self.requests);
        let bridge = self.bridge.clone();
        let path = self.config.realtime_path.clone();
        let tx = self.internal_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = sync::submit(requests, bridge, path, payload).await;
            let _ = tx.send(Internal::Submitted {
                epoch,
                purpose,
                result,
            });
        });
    }

    fn submit_finished(
        &mut self,
        epoch: u64,
        purpose: SubmitPurpose,
        result: Result<bool, RealtimeError>,
    ) {
        match purpose {
            SubmitPurpose::Update(reply) => {
                if let Err(err) = &result {
                    tracing::warn!(%err, "subscription submit failed");
                }
                let _ = reply.send(result.map(|_| ()));
            }
            SubmitPurpose::Handshake => {
                if epoch != self.epoch {
                    return;
                }
                match result {
                    Ok(_) => self.continue_handshake(),
                    Err(err) => {
                        tracing::warn!(%err, "handshake submit failed");
                        self.connection_id.clear();
                        self.connect_error(err);
                    }
                }
            }
        }
    }

    fn continue_handshake(&mut self) {
        let Phase::Handshaking { retries_left, .. } = &mut self.phase else {
            return;
        };
        if *retries_left > 0 && self.sync.has_drift(&self.registry) {
            *retries_left -= 1;
            tracing::debug!(
                retries_left = *retries_left,
                "active topics changed during handshake, resubmitting"
            );
            self.start_submit(SubmitPurpose::Handshake);
            return;
        }
        self.finish_handshake();
    }

    fn finish_handshake(&mut self) {
        if !matches!(self.phase, Phase::Handshaking { .. }) {
            return;
        }
        let Phase::Handshaking { connect_event, .. } =
            std::mem::replace(&mut self.phase, Phase::Connected)
        else {
            return;
        };

        let resolved = self.pending.resolve_all();
        self.attempts = 0;
        self.connect_deadline = None;
        self.reconnect_at = None;
        tracing::info!(
            connection_id = %self.connection_id,
            topics = self.registry.len(),
            resolved,
            "realtime connection established"
        );
        self.publish_status();

        let message = RealtimeMessage::from_event(&connect_event);
        for key in self
            .registry
            .keys_matching(&TopicFilter::Family(CONNECT_EVENT.to_string()))
        {
            self.registry.dispatch(key.as_str(), &message);
        }
    }

    /// Handles a failed or dropped connection: schedule a reconnect, or
    /// give up and reject everyone waiting.
    fn connect_error(&mut self, err: RealtimeError) {
        self.connect_deadline = None;
        self.reconnect_at = None;

        let never_connected = self.connection_id.is_empty() && self.attempts == 0;
        if never_connected || self.config.reconnect.exhausted(self.attempts) {
            let rejected = self.pending.reject_all(&err);
            tracing::warn!(%err, attempts = self.attempts, rejected, "realtime connection failed");
            self.disconnect(false);
            return;
        }

        self.disconnect(true);
        let delay = self.config.reconnect.delay_for(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        self.reconnect_at = Some(Instant::now() + delay);
        self.phase = Phase::Reconnecting;
        tracing::info!(
            %err,
            attempt = self.attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "realtime connection lost, reconnecting"
        );
        self.publish_status();
    }

    /// Tears the connection down. A soft disconnect keeps the attempt
    /// count and pending queue for the reconnect sequence; a full one
    /// resets them and settles every waiter.
    fn disconnect(&mut self, soft: bool) {
        self.connect_deadline = None;
        self.reconnect_at = None;
        if let Some(task) = self.open_task.take() {
            task.abort();
        }
        self.bridge.cancel(&cancel_key(&self.connection_id));
        self.stream = None;
        self.connection_id.clear();
        self.epoch = self.epoch.wrapping_add(1);

        if !soft {
            self.attempts = 0;
            let resolved = self.pending.resolve_all();
            if !matches!(self.phase, Phase::Idle) {
                tracing::debug!(resolved, "realtime connection closed");
            }
            self.phase = Phase::Idle;
            self.publish_status();
        }
    }

    fn publish_status(&self) {
        let status = ConnectionStatus {
            state: self.phase.state(),
            connection_id: self.connection_id.clone(),
            connected: self.stream.is_some()
                && !self.connection_id.is_empty()
                && self.pending.is_empty(),
            reconnect_attempts: self.attempts,
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}

async fn next_event(
    stream: &mut Option<EventStream>,
) -> Option<Result<ServerEvent, RealtimeError>> {
    match stream {
        Some(stream) => stream.next().await,
        None => future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
