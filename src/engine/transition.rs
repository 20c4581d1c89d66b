//! The subscribe state machine.
//!
//! [`transition`] is pure: the same state and event always produce the same
//! next state and invocation list. Within the list a `Cancel` for a slot
//! always precedes any new managed invocation for that slot.
//!
//! Failed and stopped states recover through a fresh handshake. Only the live
//! receiving states move straight back into `Receiving` on a subscription
//! change, because their cursor is still trusted.

use super::event::SubscribeEvent;
use super::invocation::{EffectKind, SubscribeEffectInvocation as Invocation};
use super::state::SubscribeState;
use crate::error::SubscribeError;
use crate::input::SubscribeInput;
use crate::messages::Envelope;
use crate::types::{ConnectionStatus, Cursor, StatusCategory};

/// Next state plus the invocations the driver must execute in order.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: SubscribeState,
    pub invocations: Vec<Invocation>,
}

impl Transition {
    fn new(state: SubscribeState, invocations: Vec<Invocation>) -> Self {
        Self { state, invocations }
    }
}

/// Compute the transition for `event` in `state`.
///
/// Returns `None` when the event has no effect in this state.
pub fn transition(state: &SubscribeState, event: SubscribeEvent) -> Option<Transition> {
    // A subscription change that leaves nothing subscribed is an unsubscribe.
    let event = match event {
        SubscribeEvent::SubscriptionChanged { input }
        | SubscribeEvent::SubscriptionRestored { input, .. }
            if input.is_empty() =>
        {
            SubscribeEvent::UnsubscribeAll
        }
        event => event,
    };

    match state {
        SubscribeState::Unsubscribed => unsubscribed(event),
        SubscribeState::Handshaking { input, cursor } => handshaking(input, *cursor, event),
        SubscribeState::HandshakeReconnecting {
            input,
            cursor,
            attempt,
            ..
        } => handshake_reconnecting(input, *cursor, *attempt, event),
        SubscribeState::HandshakeFailed { input, cursor, .. } => {
            handshake_failed(input, *cursor, event)
        }
        SubscribeState::HandshakeStopped { input, cursor } => {
            handshake_stopped(input, *cursor, event)
        }
        SubscribeState::Receiving { input, cursor } => receiving(input, *cursor, event),
        SubscribeState::ReceiveReconnecting {
            input,
            cursor,
            attempt,
            ..
        } => receive_reconnecting(input, *cursor, *attempt, event),
        SubscribeState::ReceiveFailed { input, cursor, .. } => receive_failed(input, *cursor, event),
        SubscribeState::ReceiveStopped { input, cursor } => receive_stopped(input, *cursor, event),
    }
}

fn unsubscribed(event: SubscribeEvent) -> Option<Transition> {
    match event {
        SubscribeEvent::SubscriptionChanged { input } => Some(start_handshake(input, Cursor::default())),
        SubscribeEvent::SubscriptionRestored { input, cursor } => Some(start_handshake(input, cursor)),
        _ => None,
    }
}

fn handshaking(input: &SubscribeInput, cursor: Cursor, event: SubscribeEvent) -> Option<Transition> {
    let cancel = Invocation::Cancel(EffectKind::Handshake);
    match event {
        SubscribeEvent::SubscriptionChanged { input } => Some(restart_handshake(cancel, input, cursor)),
        SubscribeEvent::SubscriptionRestored { input, cursor } => {
            Some(restart_handshake(cancel, input, cursor))
        }
        SubscribeEvent::HandshakeSuccess { cursor: received } => {
            Some(connected(cancel, input.clone(), resume_cursor(cursor, received)))
        }
        SubscribeEvent::HandshakeFailure { reason } => Some(Transition::new(
            SubscribeState::HandshakeReconnecting {
                input: input.clone(),
                cursor,
                attempt: 0,
                reason: reason.clone(),
            },
            vec![
                cancel,
                Invocation::HandshakeReconnect {
                    input: input.clone(),
                    attempt: 0,
                    reason,
                },
            ],
        )),
        SubscribeEvent::Disconnect => Some(Transition::new(
            SubscribeState::HandshakeStopped {
                input: input.clone(),
                cursor,
            },
            vec![cancel, status(StatusCategory::Disconnected, StatusCategory::Disconnected)],
        )),
        SubscribeEvent::UnsubscribeAll => Some(unsubscribe(Some(cancel), StatusCategory::Disconnected)),
        _ => None,
    }
}

fn handshake_reconnecting(
    input: &SubscribeInput,
    cursor: Cursor,
    attempt: u32,
    event: SubscribeEvent,
) -> Option<Transition> {
    let cancel = Invocation::Cancel(EffectKind::HandshakeReconnect);
    match event {
        SubscribeEvent::SubscriptionChanged { input } => Some(restart_handshake(cancel, input, cursor)),
        SubscribeEvent::SubscriptionRestored { input, cursor } => {
            Some(restart_handshake(cancel, input, cursor))
        }
        SubscribeEvent::HandshakeReconnectSuccess { cursor: received } => {
            Some(connected(cancel, input.clone(), resume_cursor(cursor, received)))
        }
        SubscribeEvent::HandshakeReconnectFailure { reason } => {
            let attempt = attempt.saturating_add(1);
            Some(Transition::new(
                SubscribeState::HandshakeReconnecting {
                    input: input.clone(),
                    cursor,
                    attempt,
                    reason: reason.clone(),
                },
                vec![
                    cancel,
                    Invocation::HandshakeReconnect {
                        input: input.clone(),
                        attempt,
                        reason,
                    },
                ],
            ))
        }
        SubscribeEvent::HandshakeReconnectGiveUp { reason } => Some(Transition::new(
            SubscribeState::HandshakeFailed {
                input: input.clone(),
                cursor,
                error: reason.clone(),
            },
            vec![
                cancel,
                status_with_error(
                    StatusCategory::Disconnected,
                    StatusCategory::ConnectionError,
                    reason,
                ),
            ],
        )),
        SubscribeEvent::Disconnect => Some(Transition::new(
            SubscribeState::HandshakeStopped {
                input: input.clone(),
                cursor,
            },
            vec![cancel, status(StatusCategory::Disconnected, StatusCategory::Disconnected)],
        )),
        SubscribeEvent::UnsubscribeAll => Some(unsubscribe(Some(cancel), StatusCategory::Disconnected)),
        _ => None,
    }
}

fn handshake_failed(input: &SubscribeInput, cursor: Cursor, event: SubscribeEvent) -> Option<Transition> {
    match event {
        SubscribeEvent::SubscriptionChanged { input } => Some(start_handshake(input, cursor)),
        SubscribeEvent::SubscriptionRestored { input, cursor } => Some(start_handshake(input, cursor)),
        SubscribeEvent::Reconnect { cursor: restored } => {
            Some(start_handshake(input.clone(), restored.unwrap_or(cursor)))
        }
        SubscribeEvent::UnsubscribeAll => Some(unsubscribe(None, StatusCategory::Disconnected)),
        _ => None,
    }
}

fn handshake_stopped(input: &SubscribeInput, cursor: Cursor, event: SubscribeEvent) -> Option<Transition> {
    match event {
        SubscribeEvent::SubscriptionChanged { input } => Some(Transition::new(
            SubscribeState::HandshakeStopped { input, cursor },
            Vec::new(),
        )),
        SubscribeEvent::SubscriptionRestored { input, cursor } => Some(Transition::new(
            SubscribeState::HandshakeStopped { input, cursor },
            Vec::new(),
        )),
        SubscribeEvent::Reconnect { cursor: restored } => {
            Some(start_handshake(input.clone(), restored.unwrap_or(cursor)))
        }
        SubscribeEvent::UnsubscribeAll => Some(unsubscribe(None, StatusCategory::Disconnected)),
        _ => None,
    }
}

fn receiving(input: &SubscribeInput, cursor: Cursor, event: SubscribeEvent) -> Option<Transition> {
    let cancel = Invocation::Cancel(EffectKind::Receive);
    match event {
        SubscribeEvent::SubscriptionChanged { input } => Some(restart_receive(cancel, input, cursor)),
        SubscribeEvent::SubscriptionRestored { input, cursor } => {
            Some(restart_receive(cancel, input, cursor))
        }
        SubscribeEvent::ReceiveSuccess { cursor, messages } => {
            Some(received(cancel, input.clone(), cursor, messages))
        }
        SubscribeEvent::ReceiveFailure { reason } => Some(Transition::new(
            SubscribeState::ReceiveReconnecting {
                input: input.clone(),
                cursor,
                attempt: 0,
                reason: reason.clone(),
            },
            vec![
                cancel,
                Invocation::ReceiveReconnect {
                    input: input.clone(),
                    cursor,
                    attempt: 0,
                    reason,
                },
            ],
        )),
        SubscribeEvent::Disconnect => Some(Transition::new(
            SubscribeState::ReceiveStopped {
                input: input.clone(),
                cursor,
            },
            vec![cancel, status(StatusCategory::Connected, StatusCategory::Disconnected)],
        )),
        SubscribeEvent::UnsubscribeAll => Some(unsubscribe(Some(cancel), StatusCategory::Connected)),
        _ => None,
    }
}

fn receive_reconnecting(
    input: &SubscribeInput,
    cursor: Cursor,
    attempt: u32,
    event: SubscribeEvent,
) -> Option<Transition> {
    let cancel = Invocation::Cancel(EffectKind::ReceiveReconnect);
    match event {
        SubscribeEvent::SubscriptionChanged { input } => Some(restart_receive(cancel, input, cursor)),
        SubscribeEvent::SubscriptionRestored { input, cursor } => {
            Some(restart_receive(cancel, input, cursor))
        }
        SubscribeEvent::ReceiveReconnectSuccess { cursor, messages } => {
            Some(received(cancel, input.clone(), cursor, messages))
        }
        SubscribeEvent::ReceiveReconnectFailure { reason } => {
            let attempt = attempt.saturating_add(1);
            Some(Transition::new(
                SubscribeState::ReceiveReconnecting {
                    input: input.clone(),
                    cursor,
                    attempt,
                    reason: reason.clone(),
                },
                vec![
                    cancel,
                    Invocation::ReceiveReconnect {
                        input: input.clone(),
                        cursor,
                        attempt,
                        reason,
                    },
                ],
            ))
        }
        SubscribeEvent::ReceiveReconnectGiveUp { reason } => Some(Transition::new(
            SubscribeState::ReceiveFailed {
                input: input.clone(),
                cursor,
                error: reason.clone(),
            },
            vec![
                cancel,
                status_with_error(
                    StatusCategory::Connected,
                    StatusCategory::DisconnectedUnexpectedly,
                    reason,
                ),
            ],
        )),
        SubscribeEvent::Disconnect => Some(Transition::new(
            SubscribeState::ReceiveStopped {
                input: input.clone(),
                cursor,
            },
            vec![cancel, status(StatusCategory::Connected, StatusCategory::Disconnected)],
        )),
        SubscribeEvent::UnsubscribeAll => Some(unsubscribe(Some(cancel), StatusCategory::Connected)),
        _ => None,
    }
}

fn receive_failed(input: &SubscribeInput, cursor: Cursor, event: SubscribeEvent) -> Option<Transition> {
    match event {
        SubscribeEvent::SubscriptionChanged { input } => Some(start_handshake(input, cursor)),
        SubscribeEvent::SubscriptionRestored { input, cursor } => Some(start_handshake(input, cursor)),
        SubscribeEvent::Reconnect { cursor: restored } => {
            Some(start_handshake(input.clone(), restored.unwrap_or(cursor)))
        }
        SubscribeEvent::UnsubscribeAll => Some(unsubscribe(None, StatusCategory::Disconnected)),
        _ => None,
    }
}

fn receive_stopped(input: &SubscribeInput, cursor: Cursor, event: SubscribeEvent) -> Option<Transition> {
    match event {
        SubscribeEvent::SubscriptionChanged { input } => Some(Transition::new(
            SubscribeState::ReceiveStopped { input, cursor },
            Vec::new(),
        )),
        SubscribeEvent::SubscriptionRestored { input, cursor } => Some(Transition::new(
            SubscribeState::ReceiveStopped { input, cursor },
            Vec::new(),
        )),
        SubscribeEvent::Reconnect { cursor: restored } => {
            Some(start_handshake(input.clone(), restored.unwrap_or(cursor)))
        }
        SubscribeEvent::UnsubscribeAll => Some(unsubscribe(None, StatusCategory::Disconnected)),
        _ => None,
    }
}

// --- Shared building blocks ---

fn start_handshake(input: SubscribeInput, cursor: Cursor) -> Transition {
    Transition::new(
        SubscribeState::Handshaking {
            input: input.clone(),
            cursor,
        },
        vec![Invocation::Handshake { input }],
    )
}

fn restart_handshake(cancel: Invocation, input: SubscribeInput, cursor: Cursor) -> Transition {
    let mut next = start_handshake(input, cursor);
    next.invocations.insert(0, cancel);
    next
}

fn restart_receive(cancel: Invocation, input: SubscribeInput, cursor: Cursor) -> Transition {
    Transition::new(
        SubscribeState::Receiving {
            input: input.clone(),
            cursor,
        },
        vec![cancel, Invocation::Receive { input, cursor }],
    )
}

fn connected(cancel: Invocation, input: SubscribeInput, cursor: Cursor) -> Transition {
    Transition::new(
        SubscribeState::Receiving {
            input: input.clone(),
            cursor,
        },
        vec![
            cancel,
            status(StatusCategory::Disconnected, StatusCategory::Connected),
            Invocation::Receive { input, cursor },
        ],
    )
}

fn received(
    cancel: Invocation,
    input: SubscribeInput,
    cursor: Cursor,
    messages: Vec<Envelope>,
) -> Transition {
    let mut invocations = vec![cancel];
    if !messages.is_empty() {
        invocations.push(Invocation::EmitMessages { cursor, messages });
    }
    invocations.push(Invocation::Receive {
        input: input.clone(),
        cursor,
    });
    Transition::new(SubscribeState::Receiving { input, cursor }, invocations)
}

fn unsubscribe(cancel: Option<Invocation>, previous: StatusCategory) -> Transition {
    let mut invocations: Vec<Invocation> = cancel.into_iter().collect();
    invocations.push(status(previous, StatusCategory::Disconnected));
    Transition::new(SubscribeState::Unsubscribed, invocations)
}

/// Cursor to receive from after a handshake.
///
/// A restored (non-zero) cursor keeps its timetoken but adopts the region
/// the handshake returned.
fn resume_cursor(stored: Cursor, received: Cursor) -> Cursor {
    if stored.is_zero() {
        received
    } else {
        Cursor::new(stored.timetoken, received.region)
    }
}

fn status(previous: StatusCategory, current: StatusCategory) -> Invocation {
    Invocation::EmitStatus(ConnectionStatus::new(previous, current))
}

fn status_with_error(previous: StatusCategory, current: StatusCategory, error: SubscribeError) -> Invocation {
    Invocation::EmitStatus(ConnectionStatus::new(previous, current).with_error(error))
}
