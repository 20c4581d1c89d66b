//! Wire envelopes and the updates delivered to listeners.
//!
//! Every item of a subscribe response arrives as an [`Envelope`]. Before
//! delivery the envelope is converted into an [`Update`], parsing the
//! payload according to its message type. A payload that does not match its
//! declared type is still delivered, downgraded to a plain message carrying
//! the decode error.

use crate::types::Cursor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Suffix of presence-shadow channels.
pub const PRESENCE_SUFFIX: &str = "-pnpres";

/// Kind of a published item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum MessageType {
    #[default]
    Message,
    Signal,
    Object,
    MessageAction,
    File,
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => MessageType::Signal,
            2 => MessageType::Object,
            3 => MessageType::MessageAction,
            4 => MessageType::File,
            _ => MessageType::Message,
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Message => 0,
            MessageType::Signal => 1,
            MessageType::Object => 2,
            MessageType::MessageAction => 3,
            MessageType::File => 4,
        }
    }
}

/// One item of a subscribe response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "c")]
    pub channel: String,

    /// Subscription (group or wildcard) that matched, when not the channel itself.
    #[serde(rename = "b", default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,

    /// Publish timetoken.
    #[serde(rename = "p")]
    pub published: Cursor,

    #[serde(rename = "i", default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(rename = "e", default)]
    pub message_type: MessageType,

    #[serde(rename = "d")]
    pub payload: Value,

    #[serde(rename = "u", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,

    #[serde(rename = "cmt", default, skip_serializing_if = "Option::is_none")]
    pub custom_message_type: Option<String>,

    /// Set when the envelope itself did not decode and was salvaged.
    #[serde(skip)]
    pub decode_error: Option<String>,
}

impl Envelope {
    /// Plain message envelope.
    pub fn message(channel: impl Into<String>, timetoken: u64, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            subscription: None,
            published: Cursor::new(timetoken, 0),
            publisher: None,
            message_type: MessageType::Message,
            payload,
            meta: None,
            custom_message_type: None,
            decode_error: None,
        }
    }

    /// Decode one wire item without failing the batch it came in.
    ///
    /// An item that does not match the envelope shape is kept as a plain
    /// message carrying the decode error, as long as it names a channel.
    /// Items without a channel cannot be routed and are dropped.
    pub fn from_wire(item: Value) -> Option<Self> {
        let error = match serde_json::from_value::<Envelope>(item.clone()) {
            Ok(envelope) => return Some(envelope),
            Err(e) => e,
        };

        let Some(channel) = item.get("c").and_then(Value::as_str) else {
            warn!(%error, "dropping envelope without a channel");
            return None;
        };
        warn!(channel, %error, "envelope did not decode, delivering raw payload");

        let text = |key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);
        let published = item
            .get("p")
            .cloned()
            .and_then(|p| serde_json::from_value::<Cursor>(p).ok())
            .unwrap_or_default();

        Some(Self {
            channel: channel.to_string(),
            subscription: text("b"),
            published,
            publisher: text("i"),
            message_type: MessageType::Message,
            payload: item.get("d").cloned().unwrap_or(Value::Null),
            meta: item.get("u").cloned(),
            custom_message_type: text("cmt"),
            decode_error: Some(format!("envelope: {error}")),
        })
    }

    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    /// Identity used for de-duplication.
    pub fn identity(&self) -> MessageIdentity {
        let mut hasher = Sha256::new();
        hasher.update(self.payload.to_string().as_bytes());
        MessageIdentity {
            channel: self.channel.clone(),
            timetoken: self.published.timetoken,
            fingerprint: hex::encode(hasher.finalize()),
        }
    }

    /// Parse the payload into the update listeners receive.
    pub fn into_update(mut self) -> Update {
        if let Some(error) = self.decode_error.take() {
            return Update::Message(Message::from_envelope(self, Some(error)));
        }
        if self.channel.ends_with(PRESENCE_SUFFIX) {
            return self.into_presence();
        }

        match self.message_type {
            MessageType::Message => Update::Message(Message::from_envelope(self, None)),
            MessageType::Signal => Update::Signal(Message::from_envelope(self, None)),
            MessageType::Object => match serde_json::from_value::<AppContextPayload>(self.payload.clone()) {
                Ok(payload) => Update::AppContext(AppContextUpdate {
                    channel: self.channel,
                    subscription: self.subscription,
                    timetoken: self.published.timetoken,
                    event: payload.event,
                    kind: payload.kind,
                    data: payload.data,
                }),
                Err(e) => self.downgrade(e),
            },
            MessageType::MessageAction => {
                match serde_json::from_value::<MessageActionPayload>(self.payload.clone()) {
                    Ok(payload) => Update::MessageAction(MessageActionUpdate {
                        channel: self.channel,
                        subscription: self.subscription,
                        publisher: self.publisher,
                        event: payload.event,
                        action_type: payload.data.action_type,
                        value: payload.data.value,
                        message_timetoken: payload.data.message_timetoken,
                        action_timetoken: payload.data.action_timetoken,
                    }),
                    Err(e) => self.downgrade(e),
                }
            }
            MessageType::File => match serde_json::from_value::<FilePayload>(self.payload.clone()) {
                Ok(payload) => Update::File(FileUpdate {
                    channel: self.channel,
                    subscription: self.subscription,
                    publisher: self.publisher,
                    timetoken: self.published.timetoken,
                    file_id: payload.file.id,
                    file_name: payload.file.name,
                    message: payload.message,
                }),
                Err(e) => self.downgrade(e),
            },
        }
    }

    fn into_presence(self) -> Update {
        match serde_json::from_value::<PresencePayload>(self.payload.clone()) {
            Ok(payload) => {
                let channel = self
                    .channel
                    .strip_suffix(PRESENCE_SUFFIX)
                    .unwrap_or(&self.channel)
                    .to_string();
                let subscription = self
                    .subscription
                    .map(|s| s.strip_suffix(PRESENCE_SUFFIX).map(str::to_string).unwrap_or(s));
                Update::Presence(PresenceUpdate {
                    channel,
                    subscription,
                    timetoken: self.published.timetoken,
                    action: payload.action,
                    uuid: payload.uuid,
                    occupancy: payload.occupancy.unwrap_or_default(),
                    timestamp: payload.timestamp.unwrap_or_default(),
                    state: payload.data,
                    join: payload.join.unwrap_or_default(),
                    leave: payload.leave.unwrap_or_default(),
                    timeout: payload.timeout.unwrap_or_default(),
                })
            }
            Err(e) => self.downgrade(e),
        }
    }

    fn downgrade(self, error: serde_json::Error) -> Update {
        let error = format!("{:?} payload: {error}", self.message_type);
        Update::Message(Message::from_envelope(self, Some(error)))
    }
}

/// What the de-duplication cache remembers about an emitted item.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageIdentity {
    pub channel: String,
    pub timetoken: u64,
    /// Hex SHA-256 of the payload.
    pub fingerprint: String,
}

/// An update delivered to listeners.
#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    Message(Message),
    Signal(Message),
    Presence(PresenceUpdate),
    MessageAction(MessageActionUpdate),
    AppContext(AppContextUpdate),
    File(FileUpdate),
}

impl Update {
    pub fn channel(&self) -> &str {
        match self {
            Update::Message(m) | Update::Signal(m) => &m.channel,
            Update::Presence(p) => &p.channel,
            Update::MessageAction(a) => &a.channel,
            Update::AppContext(o) => &o.channel,
            Update::File(f) => &f.channel,
        }
    }
}

/// A published message or signal.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub channel: String,
    pub subscription: Option<String>,
    pub timetoken: u64,
    pub publisher: Option<String>,
    pub payload: Value,
    pub meta: Option<Value>,
    pub custom_message_type: Option<String>,
    /// Set when the payload did not match its declared type.
    pub error: Option<String>,
}

impl Message {
    fn from_envelope(envelope: Envelope, error: Option<String>) -> Self {
        Self {
            channel: envelope.channel,
            subscription: envelope.subscription,
            timetoken: envelope.published.timetoken,
            publisher: envelope.publisher,
            payload: envelope.payload,
            meta: envelope.meta,
            custom_message_type: envelope.custom_message_type,
            error,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresenceAction {
    Join,
    Leave,
    Timeout,
    StateChange,
    Interval,
}

/// A presence event from a presence-shadow channel.
#[derive(Clone, Debug, PartialEq)]
pub struct PresenceUpdate {
    /// Base channel, without the presence suffix.
    pub channel: String,
    pub subscription: Option<String>,
    pub timetoken: u64,
    pub action: PresenceAction,
    pub uuid: Option<String>,
    pub occupancy: u64,
    pub timestamp: u64,
    pub state: Option<Value>,
    /// Interval deltas.
    pub join: Vec<String>,
    pub leave: Vec<String>,
    pub timeout: Vec<String>,
}

#[derive(Deserialize)]
struct PresencePayload {
    action: PresenceAction,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    occupancy: Option<u64>,
    #[serde(default)]
    timestamp: Option<u64>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    join: Option<Vec<String>>,
    #[serde(default)]
    leave: Option<Vec<String>>,
    #[serde(default)]
    timeout: Option<Vec<String>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageActionEvent {
    Added,
    Removed,
}

/// A reaction or receipt attached to an earlier message.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageActionUpdate {
    pub channel: String,
    pub subscription: Option<String>,
    pub publisher: Option<String>,
    pub event: MessageActionEvent,
    pub action_type: String,
    pub value: String,
    pub message_timetoken: String,
    pub action_timetoken: String,
}

#[derive(Deserialize)]
struct MessageActionPayload {
    event: MessageActionEvent,
    data: MessageActionData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageActionData {
    #[serde(rename = "type")]
    action_type: String,
    value: String,
    message_timetoken: String,
    action_timetoken: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppContextEvent {
    Set,
    Delete,
}

/// An app-context (objects) change.
#[derive(Clone, Debug, PartialEq)]
pub struct AppContextUpdate {
    pub channel: String,
    pub subscription: Option<String>,
    pub timetoken: u64,
    pub event: AppContextEvent,
    /// Object kind: `uuid`, `channel` or `membership`.
    pub kind: String,
    pub data: Value,
}

#[derive(Deserialize)]
struct AppContextPayload {
    event: AppContextEvent,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// A file shared on a channel.
#[derive(Clone, Debug, PartialEq)]
pub struct FileUpdate {
    pub channel: String,
    pub subscription: Option<String>,
    pub publisher: Option<String>,
    pub timetoken: u64,
    pub file_id: String,
    pub file_name: String,
    pub message: Option<Value>,
}

#[derive(Deserialize)]
struct FilePayload {
    #[serde(default)]
    message: Option<Value>,
    file: FileInfo,
}

#[derive(Deserialize)]
struct FileInfo {
    id: String,
    name: String,
}
