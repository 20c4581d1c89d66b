//! Engine configuration.

use crate::cache::DEFAULT_CACHE_SIZE;
use crate::error::{Result, SubscribeError};
use crate::retry::RetryConfiguration;
use std::time::Duration;

/// Default subscribe long-poll timeout. The service holds requests up to 280s.
pub const DEFAULT_LONG_POLL_TIMEOUT: Duration = Duration::from_secs(310);

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Subscribe key of the keyset.
    pub subscribe_key: String,

    /// Identity of this client.
    pub user_id: String,

    /// Service host.
    /// Default: ps.pndsn.com
    pub origin: String,

    /// Use https.
    pub secure: bool,

    /// Presence timeout in seconds sent as `heartbeat` (None = service default).
    pub presence_timeout: Option<u32>,

    /// Server-side message filter.
    pub filter_expression: Option<String>,

    /// Network timeout for a single long-poll request.
    pub long_poll_timeout: Duration,

    /// Emit a `RequestMessageCountExceeded` status when a response carries at
    /// least this many messages (None = never).
    pub maximum_message_count_threshold: Option<usize>,

    /// De-duplication cache capacity.
    /// Default: 100
    pub message_cache_size: usize,

    /// Retry policy for handshake and receive.
    pub retry: RetryConfiguration,

    /// Buffer size of channel-backed listener streams.
    /// Default: 1000
    pub listener_buffer_size: usize,
}

impl EngineConfig {
    pub fn new(subscribe_key: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            subscribe_key: subscribe_key.into(),
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<()> {
        if self.subscribe_key.trim().is_empty() {
            return Err(SubscribeError::InvalidConfiguration(
                "subscribe key is empty".into(),
            ));
        }
        if self.user_id.trim().is_empty() {
            return Err(SubscribeError::InvalidConfiguration("user id is empty".into()));
        }
        if self.message_cache_size == 0 {
            return Err(SubscribeError::InvalidConfiguration(
                "message cache size must be positive".into(),
            ));
        }
        if self.listener_buffer_size == 0 {
            return Err(SubscribeError::InvalidConfiguration(
                "listener buffer size must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Base URL of the service.
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}", self.origin.trim_end_matches('/'))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            subscribe_key: String::new(),
            user_id: String::new(),
            origin: "ps.pndsn.com".to_string(),
            secure: true,
            presence_timeout: None,
            filter_expression: None,
            long_poll_timeout: DEFAULT_LONG_POLL_TIMEOUT,
            maximum_message_count_threshold: None,
            message_cache_size: DEFAULT_CACHE_SIZE,
            retry: RetryConfiguration::default(),
            listener_buffer_size: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(EngineConfig::new("sub-c-key", "user-1").validate().is_ok());

        let err = EngineConfig::new("", "user-1").validate().unwrap_err();
        assert!(matches!(err, SubscribeError::InvalidConfiguration(_)));

        let err = EngineConfig::new("sub-c-key", " ").validate().unwrap_err();
        assert!(matches!(err, SubscribeError::InvalidConfiguration(_)));

        let config = EngineConfig {
            message_cache_size: 0,
            ..EngineConfig::new("sub-c-key", "user-1")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_url() {
        let mut config = EngineConfig::new("k", "u");
        assert_eq!(config.base_url(), "https://ps.pndsn.com");

        config.secure = false;
        config.origin = "localhost:8080/".into();
        assert_eq!(config.base_url(), "http://localhost:8080");
    }
}
