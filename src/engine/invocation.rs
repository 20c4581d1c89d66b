//! Effect invocations returned by transitions.

use crate::error::SubscribeError;
use crate::input::SubscribeInput;
use crate::messages::Envelope;
use crate::types::{ConnectionStatus, Cursor};
use std::fmt;

/// Kinds of effect the engine can start or cancel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Handshake,
    HandshakeReconnect,
    Receive,
    ReceiveReconnect,
    EmitStatus,
    EmitMessages,
}

/// Mutually exclusive slots for long-running effects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectSlot {
    Handshake,
    Receive,
}

impl EffectKind {
    /// Slot occupied by a long-running effect. Emit effects have none.
    pub fn slot(self) -> Option<EffectSlot> {
        match self {
            EffectKind::Handshake | EffectKind::HandshakeReconnect => Some(EffectSlot::Handshake),
            EffectKind::Receive | EffectKind::ReceiveReconnect => Some(EffectSlot::Receive),
            EffectKind::EmitStatus | EffectKind::EmitMessages => None,
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectKind::Handshake => "handshake",
            EffectKind::HandshakeReconnect => "handshake-reconnect",
            EffectKind::Receive => "receive",
            EffectKind::ReceiveReconnect => "receive-reconnect",
            EffectKind::EmitStatus => "emit-status",
            EffectKind::EmitMessages => "emit-messages",
        };
        f.write_str(name)
    }
}

/// Work the driver must start (managed) or stop (cancel).
#[derive(Clone, Debug, PartialEq)]
pub enum SubscribeEffectInvocation {
    Handshake {
        input: SubscribeInput,
    },
    HandshakeReconnect {
        input: SubscribeInput,
        attempt: u32,
        reason: SubscribeError,
    },
    Receive {
        input: SubscribeInput,
        cursor: Cursor,
    },
    ReceiveReconnect {
        input: SubscribeInput,
        cursor: Cursor,
        attempt: u32,
        reason: SubscribeError,
    },
    EmitStatus(ConnectionStatus),
    EmitMessages {
        cursor: Cursor,
        messages: Vec<Envelope>,
    },
    Cancel(EffectKind),
}

impl SubscribeEffectInvocation {
    pub fn kind(&self) -> EffectKind {
        match self {
            SubscribeEffectInvocation::Handshake { .. } => EffectKind::Handshake,
            SubscribeEffectInvocation::HandshakeReconnect { .. } => EffectKind::HandshakeReconnect,
            SubscribeEffectInvocation::Receive { .. } => EffectKind::Receive,
            SubscribeEffectInvocation::ReceiveReconnect { .. } => EffectKind::ReceiveReconnect,
            SubscribeEffectInvocation::EmitStatus(_) => EffectKind::EmitStatus,
            SubscribeEffectInvocation::EmitMessages { .. } => EffectKind::EmitMessages,
            SubscribeEffectInvocation::Cancel(kind) => *kind,
        }
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self, SubscribeEffectInvocation::Cancel(_))
    }

    /// Whether the driver must start and supervise this invocation.
    pub fn is_managed(&self) -> bool {
        !self.is_cancel() && self.kind().slot().is_some()
    }
}
