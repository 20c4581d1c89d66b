//! Core types shared by the engine, effects and listeners.

use crate::error::SubscribeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Continuation token returned by the service and echoed on the next request.
///
/// A zero timetoken means "start from now".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "WireCursor", into = "WireCursor")]
pub struct Cursor {
    pub timetoken: u64,
    pub region: u32,
}

impl Cursor {
    pub fn new(timetoken: u64, region: u32) -> Self {
        Self { timetoken, region }
    }

    /// True for the "start from now" cursor.
    pub fn is_zero(&self) -> bool {
        self.timetoken == 0
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor({}, r{})", self.timetoken, self.region)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.timetoken, self.region)
    }
}

/// Wire form: `{"t": "17000000000000000", "r": 12}`.
#[derive(Clone, Serialize, Deserialize)]
struct WireCursor {
    t: WireTimetoken,
    #[serde(default)]
    r: u32,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WireTimetoken {
    Text(String),
    Number(u64),
}

impl TryFrom<WireCursor> for Cursor {
    type Error = String;

    fn try_from(wire: WireCursor) -> std::result::Result<Self, Self::Error> {
        let timetoken = match wire.t {
            WireTimetoken::Number(value) => value,
            WireTimetoken::Text(text) if text.is_empty() => 0,
            WireTimetoken::Text(text) => text
                .parse()
                .map_err(|_| format!("invalid timetoken: {text}"))?,
        };
        Ok(Cursor::new(timetoken, wire.r))
    }
}

impl From<Cursor> for WireCursor {
    fn from(cursor: Cursor) -> Self {
        WireCursor {
            t: WireTimetoken::Text(cursor.timetoken.to_string()),
            r: cursor.region,
        }
    }
}

/// Connection status categories surfaced to listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Connected,
    Disconnected,
    /// Connection lost after it was established.
    DisconnectedUnexpectedly,
    /// Connection could not be established.
    ConnectionError,
    /// Non-fatal notice: a response hit the configured message count threshold.
    RequestMessageCountExceeded,
}

/// A status transition delivered through `emitStatus`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub previous: StatusCategory,
    pub current: StatusCategory,
    pub error: Option<SubscribeError>,
}

impl ConnectionStatus {
    pub fn new(previous: StatusCategory, current: StatusCategory) -> Self {
        Self {
            previous,
            current,
            error: None,
        }
    }

    pub fn with_error(mut self, error: SubscribeError) -> Self {
        self.error = Some(error);
        self
    }
}
