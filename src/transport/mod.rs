//! Long-poll transport used by the handshake and receive effects.
//!
//! The engine never talks HTTP itself. Effects build a [`LongPollRequest`] and
//! hand it to a [`Transport`]; the bundled [`HttpTransport`] maps it onto the
//! service's subscribe endpoint.

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
mod interrupt;

#[cfg(feature = "http")]
pub use http::HttpTransport;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::input::SubscribeInput;
use crate::messages::Envelope;
use crate::types::Cursor;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One long-poll call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LongPollRequest {
    /// Wire-level channel names, presence-shadow names included.
    pub channels: Vec<String>,
    /// Wire-level group names, presence-shadow names included.
    pub groups: Vec<String>,
    pub cursor: Cursor,
    /// Handshake calls obtain a fresh cursor.
    pub is_initial: bool,
}

impl LongPollRequest {
    /// Initial request for `input`.
    pub fn handshake(input: &SubscribeInput) -> Self {
        Self {
            channels: input.all_subscribed_channels(),
            groups: input.all_subscribed_groups(),
            cursor: Cursor::default(),
            is_initial: true,
        }
    }

    /// Continuation request for `input` from `cursor`.
    pub fn receive(input: &SubscribeInput, cursor: Cursor) -> Self {
        Self {
            channels: input.all_subscribed_channels(),
            groups: input.all_subscribed_groups(),
            cursor,
            is_initial: false,
        }
    }
}

/// Decoded long-poll result.
///
/// Only a malformed cursor or message list fails the decode. Individual
/// items go through [`Envelope::from_wire`].
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LongPollResponse {
    #[serde(rename = "t")]
    pub cursor: Cursor,
    #[serde(rename = "m", default, deserialize_with = "envelopes")]
    pub messages: Vec<Envelope>,
}

fn envelopes<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<Envelope>, D::Error> {
    let items = Vec::<Value>::deserialize(deserializer)?;
    Ok(items.into_iter().filter_map(Envelope::from_wire).collect())
}

/// Performs long-poll requests.
///
/// Implementations should return promptly with [`SubscribeError::Cancelled`]
/// once `cancel` fires. Whatever they return after cancellation is discarded.
///
/// [`SubscribeError::Cancelled`]: crate::error::SubscribeError::Cancelled
pub trait Transport: Send + Sync {
    fn long_poll(&self, request: &LongPollRequest, cancel: &CancelToken) -> Result<LongPollResponse>;
}
