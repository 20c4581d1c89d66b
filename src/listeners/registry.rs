//! Listener registry with snapshot delivery.

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::types::{
    deliver_update, DropReason, Listener, ListenerEvent, ListenerId, UpdateStream,
};
use crate::messages::{
    AppContextUpdate, FileUpdate, Message, MessageActionUpdate, PresenceUpdate, Update,
};
use crate::types::ConnectionStatus;

/// Listener that forwards into a bounded channel.
struct ChannelListener {
    sender: Sender<ListenerEvent>,
    closed: AtomicBool,
}

impl ChannelListener {
    /// Try to send an event. Marks the listener closed if the buffer is full.
    fn try_send(&self, event: ListenerEvent) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.closed.store(true, Ordering::SeqCst);
                // Best effort: the consumer may still drain and see why
                let _ = self.sender.try_send(ListenerEvent::Dropped {
                    reason: DropReason::BufferOverflow,
                });
            }
            Err(TrySendError::Disconnected(_)) => {
                self.closed.store(true, Ordering::SeqCst);
            }
        }
    }

    fn update(&self, update: Update) {
        self.try_send(ListenerEvent::Update(update));
    }
}

impl Listener for ChannelListener {
    fn on_message(&self, message: &Message) {
        self.update(Update::Message(message.clone()));
    }

    fn on_signal(&self, signal: &Message) {
        self.update(Update::Signal(signal.clone()));
    }

    fn on_presence(&self, presence: &PresenceUpdate) {
        self.update(Update::Presence(presence.clone()));
    }

    fn on_message_action(&self, action: &MessageActionUpdate) {
        self.update(Update::MessageAction(action.clone()));
    }

    fn on_app_context(&self, update: &AppContextUpdate) {
        self.update(Update::AppContext(update.clone()));
    }

    fn on_file(&self, file: &FileUpdate) {
        self.update(Update::File(file.clone()));
    }

    fn on_status(&self, status: &ConnectionStatus) {
        self.try_send(ListenerEvent::Status(status.clone()));
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct Registered {
    id: ListenerId,
    listener: Arc<dyn Listener>,
    /// Set for channel-backed streams, used to notify on removal.
    stream: Option<Arc<ChannelListener>>,
}

/// Registered listeners, in registration order.
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Registered>>,
    /// Counter for generating listener IDs.
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a callback listener.
    pub fn add(&self, listener: Arc<dyn Listener>) -> ListenerId {
        let id = self.next_id();
        self.listeners.write().push(Registered {
            id,
            listener,
            stream: None,
        });
        id
    }

    /// Register a channel-backed stream with the given buffer size.
    pub fn stream(&self, buffer_size: usize) -> UpdateStream {
        let id = self.next_id();
        let (sender, receiver) = bounded(buffer_size.max(1));
        let stream = Arc::new(ChannelListener {
            sender,
            closed: AtomicBool::new(false),
        });

        self.listeners.write().push(Registered {
            id,
            listener: stream.clone(),
            stream: Some(stream),
        });

        UpdateStream { id, receiver }
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(position) = listeners.iter().position(|r| r.id == id) else {
            return false;
        };
        let removed = listeners.remove(position);
        if let Some(stream) = removed.stream {
            let _ = stream.sender.try_send(ListenerEvent::Dropped {
                reason: DropReason::Removed,
            });
        }
        true
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Stable copy of the current listeners.
    pub fn snapshot(&self) -> Vec<Arc<dyn Listener>> {
        self.listeners
            .read()
            .iter()
            .map(|r| Arc::clone(&r.listener))
            .collect()
    }

    // --- Delivery ---

    /// Deliver an update to every listener.
    pub fn broadcast_update(&self, update: &Update) {
        self.broadcast(|listener| deliver_update(listener, update));
    }

    /// Deliver a status change to every listener.
    pub fn broadcast_status(&self, status: &ConnectionStatus) {
        self.broadcast(|listener| {
            listener.on_status(status);
            if let Some(ref error) = status.error {
                listener.on_error(error);
            }
        });
    }

    /// Internal broadcast helper. Iterates a snapshot, then drops closed listeners.
    fn broadcast<F>(&self, deliver: F)
    where
        F: Fn(&dyn Listener),
    {
        let snapshot = self.snapshot();
        let mut any_closed = false;

        for listener in &snapshot {
            if listener.is_closed() {
                any_closed = true;
                continue;
            }
            deliver(listener.as_ref());
            any_closed |= listener.is_closed();
        }

        if any_closed {
            let mut listeners = self.listeners.write();
            listeners.retain(|r| {
                let keep = !r.listener.is_closed();
                if !keep {
                    debug!(listener = r.id.0, "dropping closed listener");
                }
                keep
            });
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubscribeError;
    use crate::messages::Envelope;
    use crate::types::StatusCategory;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

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

    fn update(text: &str) -> Update {
        Envelope::message("chat", 1, json!(text)).into_update()
    }

    #[test]
    fn test_add_remove() {
        let registry = ListenerRegistry::new();

        let id = registry.add(Arc::new(Recorder::default()));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_broadcast_reaches_every_listener() {
        let registry = ListenerRegistry::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        registry.add(first.clone());
        registry.add(second.clone());

        registry.broadcast_update(&update("hello"));

        assert_eq!(first.messages.lock().len(), 1);
        assert_eq!(second.messages.lock().len(), 1);
    }

    #[test]
    fn test_status_with_error_reaches_on_error() {
        let registry = ListenerRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.add(recorder.clone());

        let status = ConnectionStatus::new(StatusCategory::Disconnected, StatusCategory::ConnectionError)
            .with_error(SubscribeError::service(403, "Forbidden"));
        registry.broadcast_status(&status);

        assert_eq!(recorder.statuses.lock().as_slice(), &[status]);
        assert_eq!(recorder.errors.lock().len(), 1);
    }

    #[test]
    fn test_stream_receives_updates() {
        let registry = ListenerRegistry::new();
        let stream = registry.stream(10);

        registry.broadcast_update(&update("hello"));

        let event = stream.recv_timeout(Duration::from_millis(100)).unwrap();
        match event {
            ListenerEvent::Update(Update::Message(message)) => {
                assert_eq!(message.payload, json!("hello"));
            }
            _ => panic!("Expected message update, got {:?}", event),
        }
    }

    #[test]
    fn test_drop_slow_stream() {
        let registry = ListenerRegistry::new();
        let _stream = registry.stream(2);

        for i in 0..10 {
            registry.broadcast_update(&update(&i.to_string()));
        }

        // Stream should be dropped
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_dropped_handle_is_pruned() {
        let registry = ListenerRegistry::new();
        let stream = registry.stream(10);
        drop(stream);

        registry.broadcast_update(&update("anyone?"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_notifies_stream() {
        let registry = ListenerRegistry::new();
        let stream = registry.stream(10);
        registry.remove(stream.id);

        let event = stream.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(
            event,
            ListenerEvent::Dropped {
                reason: DropReason::Removed
            }
        );
    }
}
