//! Listener types.

use crate::error::SubscribeError;
use crate::messages::{
    AppContextUpdate, FileUpdate, Message, MessageActionUpdate, PresenceUpdate, Update,
};
use crate::types::ConnectionStatus;

/// Receives engine output. Every callback defaults to a no-op.
///
/// Callbacks run on the delivery thread and should return quickly.
pub trait Listener: Send + Sync {
    fn on_message(&self, _message: &Message) {}

    fn on_signal(&self, _signal: &Message) {}

    fn on_presence(&self, _presence: &PresenceUpdate) {}

    fn on_message_action(&self, _action: &MessageActionUpdate) {}

    fn on_app_context(&self, _update: &AppContextUpdate) {}

    fn on_file(&self, _file: &FileUpdate) {}

    fn on_status(&self, _status: &ConnectionStatus) {}

    fn on_error(&self, _error: &SubscribeError) {}

    /// A closed listener is removed after the current delivery.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Route an update to the matching callback.
pub(crate) fn deliver_update(listener: &dyn Listener, update: &Update) {
    match update {
        Update::Message(message) => listener.on_message(message),
        Update::Signal(signal) => listener.on_signal(signal),
        Update::Presence(presence) => listener.on_presence(presence),
        Update::MessageAction(action) => listener.on_message_action(action),
        Update::AppContext(context) => listener.on_app_context(context),
        Update::File(file) => listener.on_file(file),
    }
}

/// Unique identifier for a registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Items carried by an [`UpdateStream`].
#[derive(Clone, Debug, PartialEq)]
pub enum ListenerEvent {
    Update(Update),
    Status(ConnectionStatus),
    /// The stream was removed from the registry.
    Dropped { reason: DropReason },
}

/// Why a stream was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly removed.
    Removed,
}

/// Channel-backed listener handle.
pub struct UpdateStream {
    pub id: ListenerId,
    pub receiver: crossbeam_channel::Receiver<ListenerEvent>,
}

impl UpdateStream {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<ListenerEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<ListenerEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<ListenerEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
