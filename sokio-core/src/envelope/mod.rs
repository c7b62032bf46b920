//! Application envelopes carried inside frame payloads.
//!
//! Text messages and events are plain UTF-8 JSON. Binary ones cannot be, so
//! they use a length-prefixed layout:
//! ```text
//! ┌────────────────┬──────────────────────┬─────────────────────┐
//! │ metadata len N │ metadata (JSON)      │ raw payload         │
//! │ 4 bytes, LE    │ N bytes              │ remaining bytes     │
//! └────────────────┴──────────────────────┴─────────────────────┘
//! ```

pub mod event;
pub mod factory;
pub mod message;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::EnvelopeError;

pub use event::Event;
pub use message::{randomize_file_name, Body, Message};

/// Reserved event: content names the room to join.
pub const JOIN_ROOM_EVENT: &str = "join-room";

/// Reserved event: content names the room to leave.
pub const LEAVE_ROOM_EVENT: &str = "leave-room";

pub(crate) const TEXT_TYPE: &str = "text";
pub(crate) const BINARY_TYPE: &str = "binary";

/// Flat JSON shape shared by text messages and binary metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageWire {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub receiver_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default, serialize_with = "serialize_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Fixed nine-digit fraction so timestamps compare correctly as text.
fn serialize_timestamp<S>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match ts {
        Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Nanos, true)),
        None => serializer.serialize_none(),
    }
}

/// `{eventName, message}` wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventWire {
    #[serde(default)]
    pub event_name: String,
    pub message: MessageWire,
}

/// A decoded frame payload: either a named event or a bare message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Event(Event),
    Message(Message),
}

impl Envelope {
    /// Decode a text frame payload. Objects carrying `eventName` are events.
    pub fn from_text(json: &str) -> Result<Self, EnvelopeError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.get("eventName").is_some() {
            Event::from_text(json).map(Self::Event)
        } else {
            Message::from_json(json).map(Self::Message)
        }
    }

    /// Decode a binary frame payload.
    pub fn from_binary(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let (metadata, _) = split_prefixed(bytes)?;
        let value: serde_json::Value = serde_json::from_slice(metadata)?;
        if value.get("eventName").is_some() {
            Event::from_binary(bytes).map(Self::Event)
        } else {
            Message::from_bytes(bytes).map(Self::Message)
        }
    }

    pub fn message(&self) -> &Message {
        match self {
            Self::Event(event) => event.message(),
            Self::Message(message) => message,
        }
    }

    pub fn is_binary(&self) -> bool {
        self.message().is_binary()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        match self {
            Self::Event(event) => event.to_bytes(),
            Self::Message(message) => message.to_bytes(),
        }
    }
}

/// Assemble `[len][metadata][raw]`.
pub(crate) fn write_prefixed(metadata: &[u8], raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + metadata.len() + raw.len());
    out.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
    out.extend_from_slice(metadata);
    out.extend_from_slice(raw);
    out
}

/// Split `[len][metadata][raw]` into its metadata and raw parts.
pub(crate) fn split_prefixed(bytes: &[u8]) -> Result<(&[u8], &[u8]), EnvelopeError> {
    if bytes.len() < 4 {
        return Err(EnvelopeError::TooShort(bytes.len()));
    }
    let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let available = bytes.len() - 4;
    if length == 0 || length as usize > available {
        return Err(EnvelopeError::InvalidMetadataLength { length, available });
    }
    let (metadata, raw) = bytes[4..].split_at(length as usize);
    Ok((metadata, raw))
}
