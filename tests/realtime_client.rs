//! Connection manager behaviour against scripted in-memory transports.
#![allow(clippy::panic)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use realtime_mux::client::{
    ConnectionState, ConnectionStatus, HANDSHAKE_DRIFT_RETRIES, ReconnectPolicy,
};
use realtime_mux::domain::{CONNECT_EVENT, ServerEvent, SubscribeOptions};
use realtime_mux::transport::{EventStream, EventTransport, SubmitTransport, SubscriptionPayload};
use realtime_mux::{RealtimeClient, RealtimeConfig, RealtimeError, RealtimeMessage};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Scripted event stream ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Open {
    Accept,
    Fail,
    /// Stream opens but never sends the connect event.
    Silent,
    SlowAccept(Duration),
    SlowFail(Duration),
}

type Feed = mpsc::UnboundedSender<Result<ServerEvent, RealtimeError>>;

#[derive(Debug, Default)]
struct ScriptedEvents {
    plan: Mutex<VecDeque<Open>>,
    opened_at: Mutex<Vec<Instant>>,
    feed: Mutex<Option<Feed>>,
}

impl ScriptedEvents {
    fn plan(&self, steps: impl IntoIterator<Item = Open>) {
        lock(&self.plan).extend(steps);
    }

    fn opens(&self) -> usize {
        lock(&self.opened_at).len()
    }

    fn opened_at(&self) -> Vec<Instant> {
        lock(&self.opened_at).clone()
    }

    fn push(&self, name: &str, data: &str) {
        if let Some(feed) = lock(&self.feed).as_ref() {
            let _ = feed.send(Ok(ServerEvent::new(name, "", data)));
        }
    }

    /// Ends the current stream as if the server went away.
    fn drop_connection(&self) {
        lock(&self.feed).take();
    }

    fn stream_released(&self) -> bool {
        lock(&self.feed).as_ref().is_none_or(|feed| feed.is_closed())
    }
}

#[async_trait]
impl EventTransport for ScriptedEvents {
    async fn open(&self, _path: &str) -> Result<EventStream, RealtimeError> {
        let attempt = {
            let mut opened = lock(&self.opened_at);
            opened.push(Instant::now());
            opened.len()
        };
        let step = lock(&self.plan).pop_front().unwrap_or(Open::Accept);

        match step {
            Open::SlowAccept(delay) | Open::SlowFail(delay) => tokio::time::sleep(delay).await,
            Open::Accept | Open::Fail | Open::Silent => {}
        }
        if matches!(step, Open::Fail | Open::SlowFail(_)) {
            return Err(RealtimeError::TransportOpen("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if !matches!(step, Open::Silent) {
            let id = format!("conn-{attempt}");
            let data = serde_json::json!({ "clientId": id }).to_string();
            let _ = tx.send(Ok(ServerEvent::new(CONNECT_EVENT, id, data)));
        }
        *lock(&self.feed) = Some(tx);

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}

// ── Scripted submit endpoint ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Reply {
    Accept,
    Fail(u16),
    Hang,
    Slow(Duration),
}

#[derive(Debug, Default)]
struct ScriptedSubmits {
    plan: Mutex<VecDeque<Reply>>,
    sent: Mutex<Vec<SubscriptionPayload>>,
}

impl ScriptedSubmits {
    fn plan(&self, steps: impl IntoIterator<Item = Reply>) {
        lock(&self.plan).extend(steps);
    }

    fn count(&self) -> usize {
        lock(&self.sent).len()
    }

    fn sent(&self) -> Vec<SubscriptionPayload> {
        lock(&self.sent).clone()
    }

    fn last_topics(&self) -> Vec<String> {
        let mut topics = lock(&self.sent)
            .last()
            .map(|p| p.subscriptions.clone())
            .unwrap_or_default();
        topics.sort();
        topics
    }
}

#[async_trait]
impl SubmitTransport for ScriptedSubmits {
    async fn submit(
        &self,
        _path: &str,
        payload: &SubscriptionPayload,
    ) -> Result<(), RealtimeError> {
        lock(&self.sent).push(payload.clone());
        let step = lock(&self.plan).pop_front().unwrap_or(Reply::Accept);
        match step {
            Reply::Accept => Ok(()),
            Reply::Fail(status) => Err(RealtimeError::SubmitFailed {
                status: Some(status),
                message: "rejected".to_string(),
            }),
            Reply::Hang => std::future::pending().await,
            Reply::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

// ── Harness ────────────────────────────────────────────────────────────────

struct Harness {
    client: RealtimeClient,
    events: Arc<ScriptedEvents>,
    submits: Arc<ScriptedSubmits>,
}

fn harness() -> Harness {
    harness_with(RealtimeConfig::default())
}

fn harness_with(config: RealtimeConfig) -> Harness {
    let events = Arc::new(ScriptedEvents::default());
    let submits = Arc::new(ScriptedSubmits::default());
    let client = RealtimeClient::new(
        config,
        Arc::clone(&events) as Arc<dyn EventTransport>,
        Arc::clone(&submits) as Arc<dyn SubmitTransport>,
    );
    Harness {
        client,
        events,
        submits,
    }
}

fn config_with_backoff(intervals_ms: &[u64], max_attempts: Option<u32>) -> RealtimeConfig {
    let intervals = intervals_ms.iter().map(|ms| Duration::from_millis(*ms)).collect();
    let Ok(reconnect) = ReconnectPolicy::new(intervals, max_attempts) else {
        panic!("valid policy");
    };
    RealtimeConfig {
        reconnect,
        ..RealtimeConfig::default()
    }
}

fn ignore(_: &RealtimeMessage) {}

fn forward(
    tx: &mpsc::UnboundedSender<RealtimeMessage>,
) -> impl Fn(&RealtimeMessage) + Send + Sync + 'static {
    let tx = tx.clone();
    move |msg| {
        let _ = tx.send(msg.clone());
    }
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<RealtimeMessage>) -> RealtimeMessage {
    let Ok(Some(msg)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await else {
        panic!("no message delivered");
    };
    msg
}

async fn wait_for_status<F>(client: &RealtimeClient, predicate: F) -> ConnectionStatus
where
    F: FnMut(&ConnectionStatus) -> bool,
{
    let mut watch = client.watch_status();
    let waited = tokio::time::timeout(Duration::from_secs(60), watch.wait_for(predicate)).await;
    let Ok(Ok(status)) = waited else {
        panic!("status never reached, last: {:?}", client.status());
    };
    status.clone()
}

fn assert_close(actual: Duration, expected_ms: u64) {
    let expected = Duration::from_millis(expected_ms);
    assert!(
        actual >= expected && actual <= expected + Duration::from_millis(5),
        "expected ~{expected:?}, got {actual:?}"
    );
}

// ── Connecting and dispatch ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn first_subscribe_connects_and_submits_topic() {
    let h = harness();
    assert_eq!(h.client.status().state, ConnectionState::Idle);

    let sub = assert_ok!(h.client.subscribe("products", ignore, None).await);
    assert_eq!(sub.key().as_str(), "products");

    assert_eq!(h.events.opens(), 1);
    assert_eq!(
        h.submits.sent(),
        vec![SubscriptionPayload {
            connection_id: "conn-1".to_string(),
            subscriptions: vec!["products".to_string()],
        }]
    );
    let status = h.client.status();
    assert!(h.client.is_connected());
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.connection_id, "conn-1");
}

#[tokio::test(start_paused = true)]
async fn events_reach_exact_key_listeners_in_order() {
    let h = harness();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (tx2, mut rx2) = mpsc::unbounded_channel();
    let _a = assert_ok!(h.client.subscribe("products", forward(&tx), None).await);
    let _b = assert_ok!(h.client.subscribe("products2", forward(&tx2), None).await);

    h.events.push("products", r#"{"n":1}"#);
    h.events.push("products2", r#"{"n":9}"#);
    h.events.push("products", r#"{"n":2}"#);

    assert_eq!(recv(&mut rx).await.data["n"], 1);
    assert_eq!(recv(&mut rx).await.data["n"], 2);
    let other = recv(&mut rx2).await;
    assert_eq!(other.topic, "products2");
    assert_eq!(other.data["n"], 9);
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn empty_topic_fails_before_connecting() {
    let h = harness();
    let err = assert_err!(h.client.subscribe("", ignore, None).await);
    assert!(matches!(err, RealtimeError::InvalidArgument(_)));
    assert_eq!(h.events.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn identical_options_share_one_server_subscription() {
    let h = harness();
    let opts = SubscribeOptions::new().with_query("a", 1);
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, mut rx2) = mpsc::unbounded_channel();

    let first = assert_ok!(h.client.subscribe("products", forward(&tx1), Some(opts.clone())).await);
    let second = assert_ok!(h.client.subscribe("products", forward(&tx2), Some(opts)).await);
    assert_eq!(first.key(), second.key());
    assert_eq!(h.submits.count(), 1);

    assert_ok!(first.unsubscribe().await);
    assert_eq!(h.submits.count(), 1);
    assert!(h.client.is_connected());

    h.events.push(second.key().as_str(), r#"{"ok":true}"#);
    assert_eq!(recv(&mut rx2).await.data["ok"], true);
    assert!(rx1.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn connect_event_listeners_run_after_every_connect() {
    let h = harness();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = assert_ok!(h.client.subscribe(CONNECT_EVENT, forward(&tx), None).await);

    let first = recv(&mut rx).await;
    assert_eq!(first.topic, CONNECT_EVENT);
    assert_eq!(first.data["clientId"], "conn-1");

    h.events.drop_connection();
    let second = recv(&mut rx).await;
    assert_eq!(second.data["clientId"], "conn-2");
}

// ── Unsubscribing ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn removing_last_listener_closes_connection() {
    let h = harness();
    let sub = assert_ok!(h.client.subscribe("products", ignore, None).await);
    assert!(h.client.is_connected());

    assert_ok!(sub.unsubscribe().await);
    let status = h.client.status();
    assert_eq!(status.state, ConnectionState::Idle);
    assert!(status.connection_id.is_empty());
    assert!(!h.client.is_connected());
    assert!(h.events.stream_released());

    // Idempotent.
    assert_ok!(sub.unsubscribe().await);
    assert!(!sub.is_active());
    assert_eq!(h.events.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_exact_key_resubmits_remaining_set() {
    let h = harness();
    let _a = assert_ok!(h.client.subscribe("a", ignore, None).await);
    let _b = assert_ok!(h.client.subscribe("b", ignore, None).await);
    assert_eq!(h.submits.last_topics(), vec!["a", "b"]);

    assert_ok!(h.client.unsubscribe(Some("a")).await);
    assert_eq!(h.submits.last_topics(), vec!["b"]);
    assert!(h.client.is_connected());

    assert_ok!(h.client.unsubscribe(None).await);
    assert_eq!(h.client.status().state, ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_by_prefix_spares_lookalike_topics() {
    let h = harness();
    let opts = SubscribeOptions::new().with_header("x-scope", "mine");
    let _a = assert_ok!(h.client.subscribe("products", ignore, None).await);
    let _b = assert_ok!(h.client.subscribe("products", ignore, Some(opts)).await);
    let _c = assert_ok!(h.client.subscribe("products2", ignore, None).await);
    assert_eq!(h.submits.last_topics().len(), 3);

    assert_ok!(h.client.unsubscribe_by_prefix("products").await);
    assert_eq!(h.submits.last_topics(), vec!["products2"]);
    assert!(h.client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn collection_scope_prefixes_and_clears_its_topics() {
    let h = harness();
    let products = h.client.collection("products");
    let opts = SubscribeOptions::new().with_query("expand", "owner");
    let all = assert_ok!(products.subscribe("*", ignore, None).await);
    let _one = assert_ok!(products.subscribe("rec1", ignore, Some(opts)).await);
    let _other = assert_ok!(h.client.subscribe("products2/*", ignore, None).await);
    assert_eq!(all.key().as_str(), "products/*");

    let err = assert_err!(products.subscribe("", ignore, None).await);
    assert!(matches!(err, RealtimeError::InvalidArgument(_)));

    assert_ok!(products.unsubscribe(Some("rec1")).await);
    assert_eq!(h.submits.last_topics(), vec!["products/*", "products2/*"]);

    assert_ok!(products.unsubscribe(None).await);
    assert_eq!(h.submits.last_topics(), vec!["products2/*"]);
}

// ── Concurrency and failures ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn concurrent_requests_share_one_connect_attempt() {
    let h = harness();
    h.events.plan([Open::SlowAccept(Duration::from_millis(50))]);

    let (a, b, c) = tokio::join!(
        h.client.subscribe("a", ignore, None),
        h.client.subscribe("b", ignore, None),
        h.client.connect(),
    );
    assert_ok!(a);
    assert_ok!(b);
    assert_ok!(c);

    assert_eq!(h.events.opens(), 1);
    assert_eq!(h.submits.count(), 1);
    assert_eq!(h.submits.last_topics(), vec!["a", "b"]);
    assert!(h.client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn first_connect_failure_rejects_every_waiter() {
    let h = harness();
    h.events.plan([Open::SlowFail(Duration::from_millis(50))]);

    let (a, b) = tokio::join!(
        h.client.subscribe("a", ignore, None),
        h.client.subscribe("b", ignore, None),
    );
    assert!(matches!(assert_err!(a), RealtimeError::TransportOpen(_)));
    assert!(matches!(assert_err!(b), RealtimeError::TransportOpen(_)));
    assert_eq!(h.events.opens(), 1);
    assert_eq!(h.client.status().state, ConnectionState::Idle);

    // Failed subscribes left nothing behind.
    let _c = assert_ok!(h.client.subscribe("c", ignore, None).await);
    assert_eq!(h.events.opens(), 2);
    assert_eq!(h.submits.last_topics(), vec!["c"]);
}

#[tokio::test(start_paused = true)]
async fn missing_connect_event_times_out() {
    let h = harness();
    h.events.plan([Open::Silent]);
    let started = Instant::now();

    let err = assert_err!(h.client.subscribe("a", ignore, None).await);
    assert_eq!(err, RealtimeError::HandshakeTimeout(Duration::from_secs(15)));
    assert!(started.elapsed() >= Duration::from_secs(15));
    assert_eq!(h.client.status().state, ConnectionState::Idle);
    assert!(h.events.stream_released());
}

#[tokio::test(start_paused = true)]
async fn reconnects_on_backoff_table_and_resubmits_everything() {
    let h = harness();
    let _a = assert_ok!(h.client.subscribe("a", ignore, None).await);
    let _b = assert_ok!(h.client.subscribe("b", ignore, None).await);

    h.events.plan([Open::Fail, Open::Fail, Open::Fail]);
    let dropped = Instant::now();
    h.events.drop_connection();

    let status = wait_for_status(&h.client, |s| {
        s.state == ConnectionState::Connected && s.connection_id == "conn-5"
    })
    .await;
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.reconnect_attempts, 0);

    let opened = h.events.opened_at();
    assert_eq!(opened.len(), 5);
    let mut previous = dropped;
    for (at, expected) in opened.iter().skip(1).zip([200, 300, 500, 1000]) {
        assert_close(at.duration_since(previous), expected);
        previous = *at;
    }

    let Some(last) = h.submits.sent().pop() else {
        panic!("expected a resubmit");
    };
    assert_eq!(last.connection_id, "conn-5");
    assert_eq!(h.submits.last_topics(), vec!["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn backoff_reuses_last_delay_past_table_end() {
    let h = harness_with(config_with_backoff(&[10, 20], None));
    let _a = assert_ok!(h.client.subscribe("a", ignore, None).await);

    h.events.plan([Open::Fail; 4]);
    let dropped = Instant::now();
    h.events.drop_connection();
    wait_for_status(&h.client, |s| {
        s.state == ConnectionState::Connected && s.connection_id == "conn-6"
    })
    .await;

    let opened = h.events.opened_at();
    let mut previous = dropped;
    for (at, expected) in opened.iter().skip(1).zip([10, 20, 20, 20, 20]) {
        assert_close(at.duration_since(previous), expected);
        previous = *at;
    }
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_attempt_ceiling() {
    let h = harness_with(config_with_backoff(&[10], Some(2)));
    let _a = assert_ok!(h.client.subscribe("a", ignore, None).await);

    h.events.plan([Open::Fail; 10]);
    h.events.drop_connection();
    wait_for_status(&h.client, |s| s.state == ConnectionState::Reconnecting).await;

    let err = assert_err!(h.client.connect().await);
    assert!(matches!(err, RealtimeError::TransportOpen(_)));
    assert_eq!(h.events.opens(), 4);

    let status = h.client.status();
    assert_eq!(status.state, ConnectionState::Idle);
    assert_eq!(status.reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_submit_reaches_caller_and_keeps_connection() {
    let h = harness();
    let _a = assert_ok!(h.client.subscribe("a", ignore, None).await);

    h.submits.plan([Reply::Fail(500)]);
    let err = assert_err!(h.client.subscribe("b", ignore, None).await);
    assert!(matches!(
        err,
        RealtimeError::SubmitFailed {
            status: Some(500),
            ..
        }
    ));
    assert!(h.client.is_connected());

    // The rejected listener was removed and the set resubmitted without it.
    assert_eq!(h.submits.count(), 3);
    assert_eq!(h.submits.last_topics(), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn aborted_submit_is_swallowed() {
    let h = harness();
    let _a = assert_ok!(h.client.subscribe("a", ignore, None).await);

    h.submits.plan([Reply::Hang]);
    let pending = tokio::spawn({
        let client = h.client.clone();
        async move { client.subscribe("b", ignore, None).await }
    });
    while h.submits.count() < 2 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_ok!(h.client.disconnect().await);
    let Ok(result) = pending.await else {
        panic!("subscribe task panicked");
    };
    assert_ok!(result);
    assert_eq!(h.client.status().state, ConnectionState::Idle);
    assert_eq!(h.submits.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn handshake_resubmits_when_topics_change_mid_flight() {
    let h = harness();
    h.submits.plan([Reply::Slow(Duration::from_millis(50))]);

    let first = tokio::spawn({
        let client = h.client.clone();
        async move { client.subscribe("a", ignore, None).await }
    });
    while h.submits.count() < 1 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    let _b = assert_ok!(h.client.subscribe("b", ignore, None).await);
    let Ok(first) = first.await else {
        panic!("subscribe task panicked");
    };
    assert_ok!(first);

    let sent = h.submits.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.len() <= 1 + HANDSHAKE_DRIFT_RETRIES as usize);
    assert_eq!(sent.first().map(|p| p.subscriptions.clone()), Some(vec!["a".to_string()]));
    assert_eq!(h.submits.last_topics(), vec!["a", "b"]);
    assert!(h.client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn handshake_stops_resubmitting_after_retry_budget() {
    let h = harness();
    let slow = Reply::Slow(Duration::from_millis(50));
    h.submits.plan([slow; 8]);

    let spawn_subscribe = |topic: String| {
        let client = h.client.clone();
        tokio::spawn(async move { client.subscribe(&topic, ignore, None).await })
    };

    // A new key lands during every handshake submit, so drift never settles.
    let mut waiting = vec![spawn_subscribe("t0".to_string())];
    let budget = 1 + HANDSHAKE_DRIFT_RETRIES as usize;
    for round in 1..=budget {
        while h.submits.count() < round {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        waiting.push(spawn_subscribe(format!("t{round}")));
    }

    for task in waiting {
        let Ok(result) = task.await else {
            panic!("subscribe task panicked");
        };
        assert_ok!(result);
    }

    let status = h.client.status();
    assert_eq!(status.state, ConnectionState::Connected);
    let sent = h.submits.sent();
    assert_eq!(sent.len(), budget);
    assert!(sent.iter().all(|p| p.connection_id == "conn-1"));
    // The key added during the last submit was never sent.
    assert!(!h.submits.last_topics().contains(&format!("t{budget}")));
}

#[tokio::test(start_paused = true)]
async fn queued_connect_keeps_client_disconnected_until_handshake_ends() {
    let h = harness();
    h.submits.plan([Reply::Slow(Duration::from_millis(50))]);

    let first = tokio::spawn({
        let client = h.client.clone();
        async move { client.subscribe("a", ignore, None).await }
    });
    while h.submits.count() < 1 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let status = h.client.status();
    assert_eq!(status.connection_id, "conn-1");
    assert!(!status.connected);
    assert!(!h.client.is_connected());

    let Ok(first) = first.await else {
        panic!("subscribe task panicked");
    };
    assert_ok!(first);
    assert!(h.client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn abandoned_subscribe_detaches_its_listener() {
    let h = harness();
    h.events.plan([Open::SlowAccept(Duration::from_millis(100))]);

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), h.client.subscribe("a", ignore, None))
            .await;
    assert!(abandoned.is_err());

    wait_for_status(&h.client, |s| s.state == ConnectionState::Idle).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.client.status().state, ConnectionState::Idle);
    assert_eq!(h.events.opens(), 1);
    assert!(h.events.stream_released());
    assert_eq!(h.submits.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn explicit_disconnect_keeps_listeners_for_next_connect() {
    let h = harness();
    let _a = assert_ok!(h.client.subscribe("a", ignore, None).await);

    assert_ok!(h.client.disconnect().await);
    assert_eq!(h.client.status().state, ConnectionState::Idle);

    assert_ok!(h.client.connect().await);
    assert_eq!(h.events.opens(), 2);
    let Some(last) = h.submits.sent().pop() else {
        panic!("expected a resubmit");
    };
    assert_eq!(last.connection_id, "conn-2");
    assert_eq!(last.subscriptions, vec!["a".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_closes_the_stream() {
    let h = harness();
    let sub = assert_ok!(h.client.subscribe("a", ignore, None).await);
    assert!(!h.events.stream_released());

    let Harness { client, events, .. } = h;
    drop(client);
    drop(sub);
    for _ in 0..100 {
        if events.stream_released() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("stream still held after every handle was dropped");
}
