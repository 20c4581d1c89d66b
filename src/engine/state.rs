//! Subscribe engine states.

use crate::error::SubscribeError;
use crate::input::SubscribeInput;
use crate::types::{Cursor, StatusCategory};

/// The single live state of the engine.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum SubscribeState {
    /// Initial idle state.
    #[default]
    Unsubscribed,

    /// Initial long-poll in flight.
    Handshaking {
        input: SubscribeInput,
        cursor: Cursor,
    },

    /// Retrying a failed handshake.
    HandshakeReconnecting {
        input: SubscribeInput,
        cursor: Cursor,
        attempt: u32,
        reason: SubscribeError,
    },

    /// Handshake retries exhausted.
    HandshakeFailed {
        input: SubscribeInput,
        cursor: Cursor,
        error: SubscribeError,
    },

    /// Disconnected before a handshake completed.
    HandshakeStopped {
        input: SubscribeInput,
        cursor: Cursor,
    },

    /// Receiving messages.
    Receiving {
        input: SubscribeInput,
        cursor: Cursor,
    },

    /// Retrying a failed receive.
    ReceiveReconnecting {
        input: SubscribeInput,
        cursor: Cursor,
        attempt: u32,
        reason: SubscribeError,
    },

    /// Receive retries exhausted.
    ReceiveFailed {
        input: SubscribeInput,
        cursor: Cursor,
        error: SubscribeError,
    },

    /// Disconnected while receiving.
    ReceiveStopped {
        input: SubscribeInput,
        cursor: Cursor,
    },
}

impl SubscribeState {
    pub fn name(&self) -> &'static str {
        match self {
            SubscribeState::Unsubscribed => "Unsubscribed",
            SubscribeState::Handshaking { .. } => "Handshaking",
            SubscribeState::HandshakeReconnecting { .. } => "HandshakeReconnecting",
            SubscribeState::HandshakeFailed { .. } => "HandshakeFailed",
            SubscribeState::HandshakeStopped { .. } => "HandshakeStopped",
            SubscribeState::Receiving { .. } => "Receiving",
            SubscribeState::ReceiveReconnecting { .. } => "ReceiveReconnecting",
            SubscribeState::ReceiveFailed { .. } => "ReceiveFailed",
            SubscribeState::ReceiveStopped { .. } => "ReceiveStopped",
        }
    }

    /// Subscription set, `None` when unsubscribed.
    pub fn input(&self) -> Option<&SubscribeInput> {
        match self {
            SubscribeState::Unsubscribed => None,
            SubscribeState::Handshaking { input, .. }
            | SubscribeState::HandshakeReconnecting { input, .. }
            | SubscribeState::HandshakeFailed { input, .. }
            | SubscribeState::HandshakeStopped { input, .. }
            | SubscribeState::Receiving { input, .. }
            | SubscribeState::ReceiveReconnecting { input, .. }
            | SubscribeState::ReceiveFailed { input, .. }
            | SubscribeState::ReceiveStopped { input, .. } => Some(input),
        }
    }

    /// Continuation cursor, `None` when unsubscribed.
    pub fn cursor(&self) -> Option<Cursor> {
        match self {
            SubscribeState::Unsubscribed => None,
            SubscribeState::Handshaking { cursor, .. }
            | SubscribeState::HandshakeReconnecting { cursor, .. }
            | SubscribeState::HandshakeFailed { cursor, .. }
            | SubscribeState::HandshakeStopped { cursor, .. }
            | SubscribeState::Receiving { cursor, .. }
            | SubscribeState::ReceiveReconnecting { cursor, .. }
            | SubscribeState::ReceiveFailed { cursor, .. }
            | SubscribeState::ReceiveStopped { cursor, .. } => Some(*cursor),
        }
    }

    /// Connection category a listener would observe in this state.
    pub fn status(&self) -> StatusCategory {
        match self {
            SubscribeState::Receiving { .. } | SubscribeState::ReceiveReconnecting { .. } => {
                StatusCategory::Connected
            }
            SubscribeState::HandshakeFailed { .. } => StatusCategory::ConnectionError,
            SubscribeState::ReceiveFailed { .. } => StatusCategory::DisconnectedUnexpectedly,
            _ => StatusCategory::Disconnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsubscribed_has_no_input() {
        let state = SubscribeState::default();
        assert_eq!(state.name(), "Unsubscribed");
        assert!(state.input().is_none());
        assert!(state.cursor().is_none());
        assert_eq!(state.status(), StatusCategory::Disconnected);
    }

    #[test]
    fn test_accessors() {
        let state = SubscribeState::ReceiveReconnecting {
            input: SubscribeInput::channels(["c1"]),
            cursor: Cursor::new(10, 1),
            attempt: 2,
            reason: SubscribeError::service(500, "Internal"),
        };
        assert_eq!(state.cursor(), Some(Cursor::new(10, 1)));
        assert_eq!(state.input().unwrap().subscribed_channels(), vec!["c1"]);
        assert_eq!(state.status(), StatusCategory::Connected);
    }
}
