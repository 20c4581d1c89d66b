//! Emit effects: message and status delivery to listeners.

use crate::cache::MessageCache;
use crate::error::{Result, SubscribeError};
use crate::listeners::ListenerRegistry;
use crate::messages::Envelope;
use crate::types::{ConnectionStatus, Cursor, StatusCategory};
use crossbeam_channel::{unbounded, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// Work queued for the delivery thread.
#[derive(Debug)]
pub(crate) enum Delivery {
    Messages {
        cursor: Cursor,
        messages: Vec<Envelope>,
    },
    Status(ConnectionStatus),
}

/// Delivers batches and status changes, dropping duplicates.
pub(crate) struct Emitter {
    cache: MessageCache,
    listeners: Arc<ListenerRegistry>,
    /// Batch size that triggers a count-exceeded notice.
    count_threshold: Option<usize>,
}

impl Emitter {
    pub fn new(listeners: Arc<ListenerRegistry>, cache_size: usize, count_threshold: Option<usize>) -> Self {
        Self {
            cache: MessageCache::new(cache_size),
            listeners,
            count_threshold,
        }
    }

    /// Deliver a batch in order. Returns how many items were delivered.
    pub fn emit_messages(&mut self, cursor: Cursor, messages: Vec<Envelope>) -> usize {
        let total = messages.len();

        if let Some(threshold) = self.count_threshold {
            if total >= threshold {
                debug!(total, threshold, "message count threshold reached");
                self.listeners.broadcast_status(&ConnectionStatus::new(
                    StatusCategory::Connected,
                    StatusCategory::RequestMessageCountExceeded,
                ));
            }
        }

        let mut delivered = 0;
        for envelope in messages {
            if !self.cache.insert(envelope.identity()) {
                trace!(channel = %envelope.channel, timetoken = envelope.published.timetoken, "duplicate dropped");
                continue;
            }
            self.listeners.broadcast_update(&envelope.into_update());
            delivered += 1;
        }

        debug!(%cursor, total, delivered, "messages emitted");
        delivered
    }

    pub fn emit_status(&self, status: &ConnectionStatus) {
        debug!(previous = ?status.previous, current = ?status.current, "status emitted");
        self.listeners.broadcast_status(status);
    }

    fn deliver(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Messages { cursor, messages } => {
                self.emit_messages(cursor, messages);
            }
            Delivery::Status(status) => self.emit_status(&status),
        }
    }
}

/// Start the delivery thread. It exits once every sender is dropped.
pub(crate) fn spawn_delivery(mut emitter: Emitter) -> Result<(Sender<Delivery>, JoinHandle<()>)> {
    let (sender, receiver) = unbounded::<Delivery>();
    let handle = thread::Builder::new()
        .name("subscribe-delivery".into())
        .spawn(move || {
            for delivery in receiver {
                emitter.deliver(delivery);
            }
            debug!("delivery thread exited");
        })
        .map_err(|e| SubscribeError::Spawn(e.to_string()))?;
    Ok((sender, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listeners::{Listener, ListenerEvent};
    use crate::messages::{Message, Update};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<Message>>,
        statuses: Mutex<Vec<ConnectionStatus>>,
    }

    impl Listener for Recorder {
        fn on_message(&self, message: &Message) {
            self.messages.lock().push(message.clone());
        }

        fn on_status(&self, status: &ConnectionStatus) {
            self.statuses.lock().push(status.clone());
        }
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let registry = Arc::new(ListenerRegistry::new());
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        registry.add(first.clone());
        registry.add(second.clone());

        let mut emitter = Emitter::new(registry, 100, None);
        let cached = Envelope::message("chat", 1, json!("old"));
        assert_eq!(emitter.emit_messages(Cursor::new(1, 1), vec![cached.clone()]), 1);

        let fresh = Envelope::message("chat", 2, json!("new"));
        let delivered = emitter.emit_messages(Cursor::new(2, 1), vec![cached, fresh]);
        assert_eq!(delivered, 1);

        for recorder in [&first, &second] {
            let messages = recorder.messages.lock();
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[1].payload, json!("new"));
        }
    }

    #[test]
    fn test_batch_order_is_kept() {
        let registry = Arc::new(ListenerRegistry::new());
        let recorder = Arc::new(Recorder::default());
        registry.add(recorder.clone());

        let mut emitter = Emitter::new(registry, 100, None);
        let batch = (0..5)
            .map(|n| Envelope::message("chat", n, json!(n)))
            .collect();
        emitter.emit_messages(Cursor::new(5, 1), batch);

        let timetokens: Vec<u64> = recorder.messages.lock().iter().map(|m| m.timetoken).collect();
        assert_eq!(timetokens, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_count_threshold_notice_does_not_suppress() {
        let registry = Arc::new(ListenerRegistry::new());
        let recorder = Arc::new(Recorder::default());
        registry.add(recorder.clone());

        let mut emitter = Emitter::new(registry, 100, Some(2));
        let batch = vec![
            Envelope::message("chat", 1, json!(1)),
            Envelope::message("chat", 2, json!(2)),
        ];
        assert_eq!(emitter.emit_messages(Cursor::new(2, 1), batch), 2);

        let statuses = recorder.statuses.lock();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].current, StatusCategory::RequestMessageCountExceeded);
        assert_eq!(recorder.messages.lock().len(), 2);
    }

    #[test]
    fn test_delivery_thread() {
        let registry = Arc::new(ListenerRegistry::new());
        let stream = registry.stream(10);
        let (sender, handle) = spawn_delivery(Emitter::new(registry, 100, None)).unwrap();

        sender
            .send(Delivery::Status(ConnectionStatus::new(
                StatusCategory::Disconnected,
                StatusCategory::Connected,
            )))
            .unwrap();
        sender
            .send(Delivery::Messages {
                cursor: Cursor::new(1, 1),
                messages: vec![Envelope::message("chat", 1, json!("hi"))],
            })
            .unwrap();
        drop(sender);
        handle.join().unwrap();

        assert!(matches!(
            stream.recv_timeout(Duration::from_millis(100)),
            Ok(ListenerEvent::Status(_))
        ));
        assert!(matches!(
            stream.recv_timeout(Duration::from_millis(100)),
            Ok(ListenerEvent::Update(Update::Message(_)))
        ));
    }
}
