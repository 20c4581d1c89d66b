//! Error types for the subscribe engine.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Transport failure classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    NameResolution,
    Connection,
    Tls,
    Timeout,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::NameResolution => "name resolution",
            TransportErrorKind::Connection => "connection",
            TransportErrorKind::Tls => "tls",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Other => "network",
        };
        f.write_str(name)
    }
}

/// Main error type for engine operations.
///
/// Errors are carried inside states and events, so the type is cheap to
/// clone and comparable.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SubscribeError {
    #[error("Transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Service error {status}: {message}")]
    Service {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Engine stopped")]
    EngineStopped,

    #[error("Failed to spawn worker: {0}")]
    Spawn(String),
}

impl SubscribeError {
    /// Shorthand for a transport failure.
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        SubscribeError::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a service failure without a retry hint.
    pub fn service(status: u16, message: impl Into<String>) -> Self {
        SubscribeError::Service {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    /// True for errors produced by the engine retiring its own work.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SubscribeError::Cancelled)
    }

    /// HTTP status for service errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            SubscribeError::Service { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SubscribeError {
    fn from(e: serde_json::Error) -> Self {
        SubscribeError::Decode(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SubscribeError>;
