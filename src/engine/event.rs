//! Events fed into the subscribe engine.

use crate::error::SubscribeError;
use crate::input::SubscribeInput;
use crate::messages::Envelope;
use crate::types::Cursor;

/// External commands and effect outcomes.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscribeEvent {
    // --- Commands ---
    /// The subscription set changed.
    SubscriptionChanged { input: SubscribeInput },

    /// The subscription set changed and catch-up should start at `cursor`.
    SubscriptionRestored {
        input: SubscribeInput,
        cursor: Cursor,
    },

    /// Leave a failed or stopped state, optionally from a given cursor.
    Reconnect { cursor: Option<Cursor> },

    Disconnect,

    UnsubscribeAll,

    // --- Handshake outcomes ---
    HandshakeSuccess { cursor: Cursor },
    HandshakeFailure { reason: SubscribeError },
    HandshakeReconnectSuccess { cursor: Cursor },
    HandshakeReconnectFailure { reason: SubscribeError },
    HandshakeReconnectGiveUp { reason: SubscribeError },

    // --- Receive outcomes ---
    ReceiveSuccess {
        cursor: Cursor,
        messages: Vec<Envelope>,
    },
    ReceiveFailure { reason: SubscribeError },
    ReceiveReconnectSuccess {
        cursor: Cursor,
        messages: Vec<Envelope>,
    },
    ReceiveReconnectFailure { reason: SubscribeError },
    ReceiveReconnectGiveUp { reason: SubscribeError },
}

impl SubscribeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SubscribeEvent::SubscriptionChanged { .. } => "SubscriptionChanged",
            SubscribeEvent::SubscriptionRestored { .. } => "SubscriptionRestored",
            SubscribeEvent::Reconnect { .. } => "Reconnect",
            SubscribeEvent::Disconnect => "Disconnect",
            SubscribeEvent::UnsubscribeAll => "UnsubscribeAll",
            SubscribeEvent::HandshakeSuccess { .. } => "HandshakeSuccess",
            SubscribeEvent::HandshakeFailure { .. } => "HandshakeFailure",
            SubscribeEvent::HandshakeReconnectSuccess { .. } => "HandshakeReconnectSuccess",
            SubscribeEvent::HandshakeReconnectFailure { .. } => "HandshakeReconnectFailure",
            SubscribeEvent::HandshakeReconnectGiveUp { .. } => "HandshakeReconnectGiveUp",
            SubscribeEvent::ReceiveSuccess { .. } => "ReceiveSuccess",
            SubscribeEvent::ReceiveFailure { .. } => "ReceiveFailure",
            SubscribeEvent::ReceiveReconnectSuccess { .. } => "ReceiveReconnectSuccess",
            SubscribeEvent::ReceiveReconnectFailure { .. } => "ReceiveReconnectFailure",
            SubscribeEvent::ReceiveReconnectGiveUp { .. } => "ReceiveReconnectGiveUp",
        }
    }
}
