//! End-to-end tests driving a subscriber over a scripted transport.

use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use subscribe_engine::retry::is_retryable;
use subscribe_engine::{
    CancelToken, ConnectionStatus, Cursor, EngineConfig, Envelope, Listener, ListenerEvent,
    LongPollRequest, LongPollResponse, Message, Result, RetryPolicy, StatusCategory,
    SubscribeError, SubscribeState, Subscriber, Transport, TransportErrorKind, Update,
    UpdateStream,
};

/// Replays scripted results; parks like an idle long-poll once they run out.
struct ScriptedTransport {
    results: Mutex<VecDeque<Result<LongPollResponse>>>,
    requests: Mutex<Vec<LongPollRequest>>,
}

impl ScriptedTransport {
    fn new(results: Vec<Result<LongPollResponse>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn push(&self, result: Result<LongPollResponse>) {
        self.results.lock().push_back(result);
    }

    fn requests(&self) -> Vec<LongPollRequest> {
        self.requests.lock().clone()
    }
}

impl Transport for ScriptedTransport {
    fn long_poll(&self, request: &LongPollRequest, cancel: &CancelToken) -> Result<LongPollResponse> {
        self.requests.lock().push(request.clone());
        let next = self.results.lock().pop_front();
        match next {
            Some(result) => result,
            None => {
                cancel.sleep(Duration::from_secs(30));
                Err(SubscribeError::Cancelled)
            }
        }
    }
}

/// Retries at once, up to a limit.
struct StubRetry(u32);

impl RetryPolicy for StubRetry {
    fn delay(&self, attempt: u32, error: &SubscribeError) -> Option<Duration> {
        (attempt < self.0 && is_retryable(error)).then_some(Duration::ZERO)
    }
}

#[derive(Default)]
struct Recorder {
    messages: Mutex<Vec<Message>>,
    statuses: Mutex<Vec<ConnectionStatus>>,
    errors: Mutex<Vec<SubscribeError>>,
}

impl Listener for Recorder {
    fn on_message(&self, message: &Message) {
        self.messages.lock().push(message.clone());
    }

    fn on_status(&self, status: &ConnectionStatus) {
        self.statuses.lock().push(status.clone());
    }

    fn on_error(&self, error: &SubscribeError) {
        self.errors.lock().push(error.clone());
    }
}

fn subscriber(transport: Arc<ScriptedTransport>, retries: u32) -> Subscriber {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    Subscriber::with_retry_policy(
        EngineConfig::new("sub-c-key", "user-1"),
        transport,
        Arc::new(StubRetry(retries)),
    )
    .unwrap()
}

fn response(timetoken: u64, messages: Vec<Envelope>) -> Result<LongPollResponse> {
    Ok(LongPollResponse {
        cursor: Cursor::new(timetoken, 1),
        messages,
    })
}

fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn next_update(stream: &UpdateStream) -> Update {
    loop {
        match stream.recv_timeout(Duration::from_secs(5)) {
            Ok(ListenerEvent::Update(update)) => return update,
            Ok(_) => continue,
            Err(e) => panic!("No update: {e}"),
        }
    }
}

fn next_status(stream: &UpdateStream) -> ConnectionStatus {
    loop {
        match stream.recv_timeout(Duration::from_secs(5)) {
            Ok(ListenerEvent::Status(status)) => return status,
            Ok(_) => continue,
            Err(e) => panic!("No status: {e}"),
        }
    }
}

// --- Happy path ---

#[test]
fn test_messages_flow_in_order_with_cursor_progression() {
    let transport = ScriptedTransport::new(vec![
        response(100, vec![]),
        response(
            101,
            vec![
                Envelope::message("c1", 101, json!("one")),
                Envelope::message("c1", 102, json!("two")),
            ],
        ),
        response(103, vec![Envelope::message("c1", 103, json!("three"))]),
    ]);
    let subscriber = subscriber(transport.clone(), 3);
    let stream = subscriber.stream();

    subscriber.subscribe(&["c1"], &[], None).unwrap();

    let status = next_status(&stream);
    assert_eq!(status.previous, StatusCategory::Disconnected);
    assert_eq!(status.current, StatusCategory::Connected);

    let payloads: Vec<_> = (0..3)
        .map(|_| match next_update(&stream) {
            Update::Message(message) => message.payload,
            other => panic!("Expected message, got {:?}", other),
        })
        .collect();
    assert_eq!(payloads, vec![json!("one"), json!("two"), json!("three")]);

    assert!(wait_until(|| subscriber.state().cursor() == Some(Cursor::new(103, 1))));
    assert!(wait_until(|| transport.requests().len() == 4));
    assert_eq!(subscriber.status(), StatusCategory::Connected);

    let requests = transport.requests();
    assert!(requests[0].is_initial);
    assert_eq!(requests[0].channels, vec!["c1"]);
    let cursors: Vec<Cursor> = requests[1..].iter().map(|r| r.cursor).collect();
    assert_eq!(
        cursors[..3],
        [Cursor::new(100, 1), Cursor::new(101, 1), Cursor::new(103, 1)]
    );
}

#[test]
fn test_duplicates_across_batches_are_delivered_once() {
    let repeated = Envelope::message("c1", 50, json!({"text": "hello"}));
    let transport = ScriptedTransport::new(vec![
        response(49, vec![]),
        response(50, vec![repeated.clone()]),
        response(51, vec![repeated, Envelope::message("c1", 51, json!({"text": "world"}))]),
    ]);
    let subscriber = subscriber(transport, 3);
    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    subscriber.add_listener(first.clone());
    subscriber.add_listener(second.clone());

    subscriber.subscribe(&["c1"], &[], None).unwrap();

    for recorder in [&first, &second] {
        assert!(wait_until(|| recorder.messages.lock().len() >= 2));
        thread::sleep(Duration::from_millis(20));
        let messages = recorder.messages.lock();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].payload, json!({"text": "hello"}));
        assert_eq!(messages[1].payload, json!({"text": "world"}));
    }
}

#[test]
fn test_presence_subscription_uses_shadow_channels() {
    let presence = Envelope::message(
        "room-pnpres",
        11,
        json!({"action": "join", "uuid": "alice", "occupancy": 2, "timestamp": 1700000000}),
    );
    let transport = ScriptedTransport::new(vec![response(10, vec![]), response(11, vec![presence])]);
    let subscriber = subscriber(transport.clone(), 3);
    let stream = subscriber.stream();

    subscriber.subscribe_with_presence(&["room"], &["lobby"], None).unwrap();

    match next_update(&stream) {
        Update::Presence(update) => {
            assert_eq!(update.channel, "room");
            assert_eq!(update.uuid.as_deref(), Some("alice"));
            assert_eq!(update.occupancy, 2);
        }
        other => panic!("Expected presence, got {:?}", other),
    }

    let requests = transport.requests();
    assert_eq!(requests[0].channels, vec!["room", "room-pnpres"]);
    assert_eq!(requests[0].groups, vec!["lobby", "lobby-pnpres"]);
    assert_eq!(subscriber.subscribed_channels(), vec!["room"]);
}

// --- Failures and recovery ---

#[test]
fn test_receive_failure_recovers_without_status_noise() {
    let transport = ScriptedTransport::new(vec![
        response(1, vec![]),
        Err(SubscribeError::transport(TransportErrorKind::Connection, "reset")),
        response(2, vec![Envelope::message("c1", 2, json!("after retry"))]),
    ]);
    let subscriber = subscriber(transport.clone(), 3);
    let recorder = Arc::new(Recorder::default());
    subscriber.add_listener(recorder.clone());

    subscriber.subscribe(&["c1"], &[], None).unwrap();

    assert!(wait_until(|| recorder.messages.lock().len() == 1));
    assert!(wait_until(|| transport.requests().len() == 4));
    assert!(wait_until(|| matches!(
        subscriber.state(),
        SubscribeState::Receiving { cursor, .. } if cursor == Cursor::new(2, 1)
    )));

    // Only the initial connect was reported
    assert_eq!(recorder.statuses.lock().len(), 1);
    assert!(recorder.errors.lock().is_empty());

    // The retry reused the cursor from before the failure
    let requests = transport.requests();
    assert_eq!(requests[2].cursor, Cursor::new(1, 1));
    assert!(!requests[2].is_initial);
}

#[test]
fn test_handshake_give_up_and_reconnect() {
    let failure = SubscribeError::service(503, "Service Unavailable");
    let transport = ScriptedTransport::new(vec![
        Err(failure.clone()),
        Err(failure.clone()),
        Err(failure.clone()),
    ]);
    let subscriber = subscriber(transport.clone(), 2);
    let recorder = Arc::new(Recorder::default());
    subscriber.add_listener(recorder.clone());

    subscriber.subscribe(&["c1"], &[], None).unwrap();

    assert!(wait_until(|| matches!(subscriber.state(), SubscribeState::HandshakeFailed { .. })));
    assert_eq!(subscriber.status(), StatusCategory::ConnectionError);
    assert!(wait_until(|| recorder.errors.lock().len() == 1));
    assert_eq!(recorder.errors.lock()[0], failure);
    assert_eq!(
        recorder.statuses.lock().last().map(|s| s.current),
        Some(StatusCategory::ConnectionError)
    );

    // Initial attempt plus two retries
    assert_eq!(transport.requests().len(), 3);

    transport.push(response(77, vec![]));
    subscriber.reconnect(None).unwrap();

    assert!(wait_until(|| subscriber.status() == StatusCategory::Connected));
    assert!(transport.requests()[3].is_initial);
}

#[test]
fn test_non_retryable_failure_gives_up_at_once() {
    let transport = ScriptedTransport::new(vec![
        response(1, vec![]),
        Err(SubscribeError::service(403, "Forbidden")),
    ]);
    let subscriber = subscriber(transport.clone(), 5);

    subscriber.subscribe(&["c1"], &[], None).unwrap();

    assert!(wait_until(|| matches!(subscriber.state(), SubscribeState::ReceiveFailed { .. })));
    assert_eq!(subscriber.status(), StatusCategory::DisconnectedUnexpectedly);
    assert_eq!(transport.requests().len(), 2);
}

// --- Commands ---

#[test]
fn test_disconnect_then_reconnect_from_cursor() {
    let transport = ScriptedTransport::new(vec![response(10, vec![])]);
    let subscriber = subscriber(transport.clone(), 3);
    let stream = subscriber.stream();

    subscriber.subscribe(&["c1"], &[], None).unwrap();
    assert_eq!(next_status(&stream).current, StatusCategory::Connected);
    assert!(wait_until(|| transport.requests().len() == 2));

    subscriber.disconnect().unwrap();
    let status = next_status(&stream);
    assert_eq!(status.previous, StatusCategory::Connected);
    assert_eq!(status.current, StatusCategory::Disconnected);
    assert!(wait_until(|| matches!(subscriber.state(), SubscribeState::ReceiveStopped { .. })));

    // Edits while stopped start no requests
    let before = transport.requests().len();
    subscriber.subscribe(&["c2"], &[], None).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(transport.requests().len(), before);

    transport.push(response(900, vec![]));
    subscriber.reconnect(Some(Cursor::new(5, 0))).unwrap();

    assert!(wait_until(|| subscriber.state().cursor() == Some(Cursor::new(5, 1))));
    assert_eq!(subscriber.status(), StatusCategory::Connected);

    let requests = transport.requests();
    let handshake = &requests[before];
    assert!(handshake.is_initial);
    assert_eq!(handshake.channels, vec!["c1", "c2"]);
}

#[test]
fn test_subscribe_with_cursor_catches_up() {
    let transport = ScriptedTransport::new(vec![response(500, vec![])]);
    let subscriber = subscriber(transport.clone(), 3);

    subscriber
        .subscribe(&["c1"], &[], Some(Cursor::new(250, 0)))
        .unwrap();

    assert!(wait_until(|| transport.requests().len() == 2));
    let requests = transport.requests();
    assert_eq!(requests[1].cursor, Cursor::new(250, 1));
}

#[test]
fn test_unsubscribe_last_channel_reports_disconnected() {
    let transport = ScriptedTransport::new(vec![response(10, vec![])]);
    let subscriber = subscriber(transport, 3);
    let stream = subscriber.stream();

    subscriber.subscribe(&["c1"], &[], None).unwrap();
    assert_eq!(next_status(&stream).current, StatusCategory::Connected);

    subscriber.unsubscribe(&["c1"], &[]).unwrap();
    assert_eq!(next_status(&stream).current, StatusCategory::Disconnected);
    assert!(wait_until(|| subscriber.state() == SubscribeState::Unsubscribed));
    assert!(subscriber.subscribed_channels().is_empty());
}

#[test]
fn test_unsubscribe_all() {
    let transport = ScriptedTransport::new(vec![response(10, vec![])]);
    let subscriber = subscriber(transport, 3);

    subscriber.subscribe(&["a", "b"], &["g"], None).unwrap();
    assert!(wait_until(|| subscriber.status() == StatusCategory::Connected));

    subscriber.unsubscribe_all().unwrap();
    assert!(wait_until(|| subscriber.state() == SubscribeState::Unsubscribed));
    assert!(subscriber.subscribed_groups().is_empty());
}

#[test]
fn test_removed_listener_stops_receiving() {
    let transport = ScriptedTransport::new(vec![response(1, vec![])]);
    let subscriber = subscriber(transport.clone(), 3);
    let recorder = Arc::new(Recorder::default());
    let id = subscriber.add_listener(recorder.clone());

    subscriber.subscribe(&["c1"], &[], None).unwrap();
    assert!(wait_until(|| recorder.statuses.lock().len() == 1));

    assert!(subscriber.remove_listener(id));
    subscriber.disconnect().unwrap();
    assert!(wait_until(|| matches!(subscriber.state(), SubscribeState::ReceiveStopped { .. })));
    thread::sleep(Duration::from_millis(20));

    assert_eq!(recorder.statuses.lock().len(), 1);
    assert!(subscriber.listeners().is_empty());
}

#[test]
fn test_shutdown_cancels_parked_requests() {
    let transport = ScriptedTransport::new(vec![response(1, vec![])]);
    let subscriber = subscriber(transport, 3);
    subscriber.subscribe(&["c1"], &[], None).unwrap();
    assert!(wait_until(|| subscriber.status() == StatusCategory::Connected));

    let started = Instant::now();
    subscriber.shutdown();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(subscriber.reconnect(None), Err(SubscribeError::EngineStopped));
}
