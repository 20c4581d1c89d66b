//! Handshake effects.

use super::EffectContext;
use crate::cancel::CancelToken;
use crate::engine::SubscribeEvent;
use crate::error::SubscribeError;
use crate::input::SubscribeInput;
use crate::transport::LongPollRequest;
use tracing::{debug, error, warn};

/// Initial long-poll for the full subscription set.
pub(super) fn handshake(
    context: &EffectContext,
    input: &SubscribeInput,
    cancel: &CancelToken,
) -> Option<SubscribeEvent> {
    let request = LongPollRequest::handshake(input);
    debug!(channels = ?request.channels, groups = ?request.groups, "handshake");

    match context.transport.long_poll(&request, cancel) {
        _ if cancel.is_cancelled() => None,
        Ok(response) => Some(SubscribeEvent::HandshakeSuccess {
            cursor: response.cursor,
        }),
        Err(SubscribeError::Cancelled) => None,
        Err(reason) => {
            warn!(error = %reason, "handshake failed");
            Some(SubscribeEvent::HandshakeFailure { reason })
        }
    }
}

/// Handshake retry after a backoff delay.
pub(super) fn handshake_reconnect(
    context: &EffectContext,
    input: &SubscribeInput,
    attempt: u32,
    reason: SubscribeError,
    cancel: &CancelToken,
) -> Option<SubscribeEvent> {
    let Some(delay) = context.retry.delay(attempt, &reason) else {
        error!(attempt, error = %reason, "handshake retries exhausted");
        return Some(SubscribeEvent::HandshakeReconnectGiveUp { reason });
    };

    warn!(attempt, ?delay, error = %reason, "retrying handshake");
    if !cancel.sleep(delay) {
        return None;
    }

    let request = LongPollRequest::handshake(input);
    match context.transport.long_poll(&request, cancel) {
        _ if cancel.is_cancelled() => None,
        Ok(response) => Some(SubscribeEvent::HandshakeReconnectSuccess {
            cursor: response.cursor,
        }),
        Err(SubscribeError::Cancelled) => None,
        Err(reason) => Some(SubscribeEvent::HandshakeReconnectFailure { reason }),
    }
}
