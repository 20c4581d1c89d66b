//! Retry and backoff policy for handshake and receive requests.

use crate::error::{SubscribeError, TransportErrorKind};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lower bound for any configured delay.
pub const MIN_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Upper bound for the exponential delay.
pub const MAX_EXPONENTIAL_DELAY: Duration = Duration::from_secs(150);

/// Most retries a linear policy may request.
pub const MAX_LINEAR_RETRIES: u32 = 10;

/// Most retries an exponential policy may request.
pub const MAX_EXPONENTIAL_RETRIES: u32 = 6;

/// Upper bound of the random jitter added to every delay (milliseconds).
const JITTER_MS: u64 = 1000;

/// Decides how long to wait before a retry.
pub trait RetryPolicy: Send + Sync {
    /// Delay before retry `attempt` (zero-based) after `error`.
    ///
    /// `None` means give up.
    fn delay(&self, attempt: u32, error: &SubscribeError) -> Option<Duration>;
}

/// Built-in retry policies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetryConfiguration {
    /// Never retry.
    None,

    /// Same delay for every attempt.
    Linear { delay: Duration, max_retry: u32 },

    /// Doubling delay between `min_delay` and `max_delay`.
    Exponential {
        min_delay: Duration,
        max_delay: Duration,
        max_retry: u32,
    },
}

impl RetryConfiguration {
    /// Linear policy, clamped to the supported bounds.
    pub fn linear(delay: Duration, max_retry: u32) -> Self {
        RetryConfiguration::Linear {
            delay: delay.max(MIN_RETRY_DELAY),
            max_retry: max_retry.min(MAX_LINEAR_RETRIES),
        }
    }

    /// Exponential policy, clamped to the supported bounds.
    pub fn exponential(min_delay: Duration, max_delay: Duration, max_retry: u32) -> Self {
        let min_delay = min_delay.clamp(MIN_RETRY_DELAY, MAX_EXPONENTIAL_DELAY);
        RetryConfiguration::Exponential {
            min_delay,
            max_delay: max_delay.clamp(min_delay, MAX_EXPONENTIAL_DELAY),
            max_retry: max_retry.min(MAX_EXPONENTIAL_RETRIES),
        }
    }

    fn max_retry(&self) -> u32 {
        match self {
            RetryConfiguration::None => 0,
            RetryConfiguration::Linear { max_retry, .. }
            | RetryConfiguration::Exponential { max_retry, .. } => *max_retry,
        }
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        match self {
            RetryConfiguration::None => Duration::ZERO,
            RetryConfiguration::Linear { delay, .. } => *delay,
            RetryConfiguration::Exponential {
                min_delay,
                max_delay,
                ..
            } => {
                let factor = 2u32.saturating_pow(attempt.min(16));
                min_delay.saturating_mul(factor).min(*max_delay)
            }
        }
    }
}

impl Default for RetryConfiguration {
    fn default() -> Self {
        RetryConfiguration::exponential(MIN_RETRY_DELAY, MAX_EXPONENTIAL_DELAY, MAX_EXPONENTIAL_RETRIES)
    }
}

impl RetryPolicy for RetryConfiguration {
    fn delay(&self, attempt: u32, error: &SubscribeError) -> Option<Duration> {
        if attempt >= self.max_retry() || !is_retryable(error) {
            return None;
        }

        if let SubscribeError::Service {
            retry_after: Some(retry_after),
            ..
        } = error
        {
            return Some(*retry_after);
        }

        Some(self.base_delay(attempt) + jitter())
    }
}

/// Whether an error class is worth retrying at all.
pub fn is_retryable(error: &SubscribeError) -> bool {
    match error {
        SubscribeError::Transport { kind, .. } => *kind != TransportErrorKind::Tls,
        SubscribeError::Service { status, .. } => *status == 429 || *status >= 500,
        SubscribeError::Cancelled
        | SubscribeError::Decode(_)
        | SubscribeError::InvalidConfiguration(_)
        | SubscribeError::EngineStopped => false,
        SubscribeError::Spawn(_) => true,
    }
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..JITTER_MS))
}
