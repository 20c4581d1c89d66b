//! Receive effects.

use super::EffectContext;
use crate::cancel::CancelToken;
use crate::engine::SubscribeEvent;
use crate::error::SubscribeError;
use crate::input::SubscribeInput;
use crate::transport::LongPollRequest;
use crate::types::Cursor;
use tracing::{debug, error, warn};

/// Long-poll from `cursor`.
pub(super) fn receive(
    context: &EffectContext,
    input: &SubscribeInput,
    cursor: Cursor,
    cancel: &CancelToken,
) -> Option<SubscribeEvent> {
    let request = LongPollRequest::receive(input, cursor);
    debug!(%cursor, "receive");

    match context.transport.long_poll(&request, cancel) {
        _ if cancel.is_cancelled() => None,
        Ok(response) => Some(SubscribeEvent::ReceiveSuccess {
            cursor: response.cursor,
            messages: response.messages,
        }),
        Err(SubscribeError::Cancelled) => None,
        Err(reason) => {
            warn!(error = %reason, %cursor, "receive failed");
            Some(SubscribeEvent::ReceiveFailure { reason })
        }
    }
}

/// Receive retry after a backoff delay.
pub(super) fn receive_reconnect(
    context: &EffectContext,
    input: &SubscribeInput,
    cursor: Cursor,
    attempt: u32,
    reason: SubscribeError,
    cancel: &CancelToken,
) -> Option<SubscribeEvent> {
    let Some(delay) = context.retry.delay(attempt, &reason) else {
        error!(attempt, error = %reason, "receive retries exhausted");
        return Some(SubscribeEvent::ReceiveReconnectGiveUp { reason });
    };

    warn!(attempt, ?delay, error = %reason, "retrying receive");
    if !cancel.sleep(delay) {
        return None;
    }

    let request = LongPollRequest::receive(input, cursor);
    match context.transport.long_poll(&request, cancel) {
        _ if cancel.is_cancelled() => None,
        Ok(response) => Some(SubscribeEvent::ReceiveReconnectSuccess {
            cursor: response.cursor,
            messages: response.messages,
        }),
        Err(SubscribeError::Cancelled) => None,
        Err(reason) => Some(SubscribeEvent::ReceiveReconnectFailure { reason }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::effects::test_support::{context, CannedTransport};
    use crate::error::TransportErrorKind;
    use crate::messages::Envelope;
    use crate::transport::LongPollResponse;
    use serde_json::json;
    use std::thread;
    use std::time::Duration;

    fn input() -> SubscribeInput {
        SubscribeInput::channels(["c1"])
    }

    #[test]
    fn test_receive_carries_cursor_and_messages() {
        let message = Envelope::message("c1", 11, json!({"n": 1}));
        let (context, transport) = context(
            CannedTransport::new(vec![Ok(LongPollResponse {
                cursor: Cursor::new(12, 3),
                messages: vec![message.clone()],
            })]),
            3,
        );
        let (_handle, token) = cancel_pair();

        let event = receive(&context, &input(), Cursor::new(10, 3), &token);
        assert_eq!(
            event,
            Some(SubscribeEvent::ReceiveSuccess {
                cursor: Cursor::new(12, 3),
                messages: vec![message],
            })
        );

        let requests = transport.requests.lock();
        assert!(!requests[0].is_initial);
        assert_eq!(requests[0].cursor, Cursor::new(10, 3));
    }

    #[test]
    fn test_receive_failure() {
        let error = SubscribeError::transport(TransportErrorKind::Timeout, "timed out");
        let (context, _) = context(CannedTransport::new(vec![Err(error.clone())]), 3);
        let (_handle, token) = cancel_pair();

        assert_eq!(
            receive(&context, &input(), Cursor::new(1, 1), &token),
            Some(SubscribeEvent::ReceiveFailure { reason: error })
        );
    }

    #[test]
    fn test_reconnect_failure_then_give_up() {
        let error = SubscribeError::service(502, "Bad Gateway");
        let (context, _) = context(CannedTransport::new(vec![Err(error.clone())]), 1);
        let (_handle, token) = cancel_pair();

        let first = receive_reconnect(&context, &input(), Cursor::new(1, 1), 0, error.clone(), &token);
        assert_eq!(
            first,
            Some(SubscribeEvent::ReceiveReconnectFailure {
                reason: error.clone()
            })
        );

        let second = receive_reconnect(&context, &input(), Cursor::new(1, 1), 1, error.clone(), &token);
        assert_eq!(second, Some(SubscribeEvent::ReceiveReconnectGiveUp { reason: error }));
    }

    #[test]
    fn test_cancel_interrupts_parked_receive() {
        // No canned results: the transport parks until cancelled
        let (context, _) = context(CannedTransport::new(vec![]), 3);
        let (handle, token) = cancel_pair();

        let worker = thread::spawn(move || receive(&context, &input(), Cursor::new(1, 1), &token));
        thread::sleep(Duration::from_millis(20));
        handle.cancel();

        assert_eq!(worker.join().unwrap(), None);
    }
}
