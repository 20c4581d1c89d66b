//! Effect handlers.
//!
//! Long-running effects (handshake, receive and their reconnect variants) run
//! on worker threads and resolve to at most one event. Emit effects run on
//! the delivery thread and resolve to none.

mod emit;
mod handshake;
mod receive;

pub(crate) use emit::{spawn_delivery, Delivery, Emitter};

use crate::cancel::CancelToken;
use crate::engine::{EffectKind, SubscribeEffectInvocation, SubscribeEvent};
use crate::error::SubscribeError;
use crate::input::SubscribeInput;
use crate::retry::RetryPolicy;
use crate::transport::Transport;
use crate::types::Cursor;
use std::sync::Arc;

/// Collaborators shared by every long-running effect.
pub(crate) struct EffectContext {
    pub transport: Arc<dyn Transport>,
    pub retry: Arc<dyn RetryPolicy>,
}

/// A long-running effect ready to execute.
#[derive(Clone, Debug)]
pub(crate) enum SubscribeEffect {
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
}

impl SubscribeEffect {
    /// Extract the long-running effect from a managed invocation.
    pub fn from_invocation(invocation: SubscribeEffectInvocation) -> Option<Self> {
        match invocation {
            SubscribeEffectInvocation::Handshake { input } => Some(SubscribeEffect::Handshake { input }),
            SubscribeEffectInvocation::HandshakeReconnect {
                input,
                attempt,
                reason,
            } => Some(SubscribeEffect::HandshakeReconnect {
                input,
                attempt,
                reason,
            }),
            SubscribeEffectInvocation::Receive { input, cursor } => {
                Some(SubscribeEffect::Receive { input, cursor })
            }
            SubscribeEffectInvocation::ReceiveReconnect {
                input,
                cursor,
                attempt,
                reason,
            } => Some(SubscribeEffect::ReceiveReconnect {
                input,
                cursor,
                attempt,
                reason,
            }),
            _ => None,
        }
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            SubscribeEffect::Handshake { .. } => EffectKind::Handshake,
            SubscribeEffect::HandshakeReconnect { .. } => EffectKind::HandshakeReconnect,
            SubscribeEffect::Receive { .. } => EffectKind::Receive,
            SubscribeEffect::ReceiveReconnect { .. } => EffectKind::ReceiveReconnect,
        }
    }

    /// Run to completion. `None` means the effect was cancelled.
    pub fn run(self, context: &EffectContext, cancel: &CancelToken) -> Option<SubscribeEvent> {
        match self {
            SubscribeEffect::Handshake { input } => handshake::handshake(context, &input, cancel),
            SubscribeEffect::HandshakeReconnect {
                input,
                attempt,
                reason,
            } => handshake::handshake_reconnect(context, &input, attempt, reason, cancel),
            SubscribeEffect::Receive { input, cursor } => {
                receive::receive(context, &input, cursor, cancel)
            }
            SubscribeEffect::ReceiveReconnect {
                input,
                cursor,
                attempt,
                reason,
            } => receive::receive_reconnect(context, &input, cursor, attempt, reason, cancel),
        }
    }

    /// Failure event for an effect that never got to run.
    pub fn failure(&self, reason: SubscribeError) -> SubscribeEvent {
        match self {
            SubscribeEffect::Handshake { .. } => SubscribeEvent::HandshakeFailure { reason },
            SubscribeEffect::HandshakeReconnect { .. } => {
                SubscribeEvent::HandshakeReconnectFailure { reason }
            }
            SubscribeEffect::Receive { .. } => SubscribeEvent::ReceiveFailure { reason },
            SubscribeEffect::ReceiveReconnect { .. } => {
                SubscribeEvent::ReceiveReconnectFailure { reason }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::Result;
    use crate::transport::{LongPollRequest, LongPollResponse};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Transport replaying canned results, recording every request.
    pub struct CannedTransport {
        results: Mutex<VecDeque<Result<LongPollResponse>>>,
        pub requests: Mutex<Vec<LongPollRequest>>,
    }

    impl CannedTransport {
        pub fn new(results: Vec<Result<LongPollResponse>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for CannedTransport {
        fn long_poll(&self, request: &LongPollRequest, cancel: &CancelToken) -> Result<LongPollResponse> {
            self.requests.lock().push(request.clone());
            match self.results.lock().pop_front() {
                Some(result) => result,
                None => {
                    // Park like a long-poll with nothing to say
                    cancel.sleep(Duration::from_secs(60));
                    Err(SubscribeError::Cancelled)
                }
            }
        }
    }

    /// Retries immediately up to a limit.
    pub struct ImmediateRetry(pub u32);

    impl RetryPolicy for ImmediateRetry {
        fn delay(&self, attempt: u32, error: &SubscribeError) -> Option<Duration> {
            (attempt < self.0 && crate::retry::is_retryable(error)).then_some(Duration::ZERO)
        }
    }

    pub fn context(transport: CannedTransport, retries: u32) -> (EffectContext, Arc<CannedTransport>) {
        let transport = Arc::new(transport);
        (
            EffectContext {
                transport: transport.clone(),
                retry: Arc::new(ImmediateRetry(retries)),
            },
            transport,
        )
    }
}
