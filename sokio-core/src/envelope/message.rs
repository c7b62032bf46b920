//! Text and binary message payloads.

use std::path::Path;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{split_prefixed, write_prefixed, MessageWire, BINARY_TYPE, TEXT_TYPE};
use crate::error::EnvelopeError;

/// Payload variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text { content: String },
    Binary { file_name: String, data: Vec<u8> },
}

/// A message with routing metadata.
///
/// `receiver_id` wins over `room_id`; with neither set the message stays
/// local to whoever receives it.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub sender_id: Option<String>,
    pub receiver_id: Option<String>,
    pub room_id: Option<String>,
    pub body: Body,
}

/// Replace a file name with a random one, keeping only its extension.
pub fn randomize_file_name(original: &str) -> String {
    let stem = Uuid::new_v4().simple().to_string();
    match Path::new(original).extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{stem}.{ext}"),
        _ => stem,
    }
}

impl Message {
    fn with_body(body: Body) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            sender_id: None,
            receiver_id: None,
            room_id: None,
            body,
        }
    }

    /// Create a text message.
    pub fn text(content: impl Into<String>) -> Self {
        Self::with_body(Body::Text {
            content: content.into(),
        })
    }

    /// Create a binary message. The given file name is replaced by a random
    /// one with the same extension.
    pub fn binary(file_name: &str, data: impl Into<Vec<u8>>) -> Self {
        Self::with_body(Body::Binary {
            file_name: randomize_file_name(file_name),
            data: data.into(),
        })
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn with_receiver(mut self, receiver_id: impl Into<String>) -> Self {
        self.receiver_id = Some(receiver_id.into());
        self
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    /// Wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self.body {
            Body::Text { .. } => TEXT_TYPE,
            Body::Binary { .. } => BINARY_TYPE,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.body, Body::Binary { .. })
    }

    pub fn content(&self) -> Option<&str> {
        match &self.body {
            Body::Text { content } => Some(content),
            Body::Binary { .. } => None,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match &self.body {
            Body::Binary { file_name, .. } => Some(file_name),
            Body::Text { .. } => None,
        }
    }

    pub fn data(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Binary { data, .. } => Some(data),
            Body::Text { .. } => None,
        }
    }

    pub(crate) fn to_wire(&self) -> MessageWire {
        let (content, file_name, file_size) = match &self.body {
            Body::Text { content } => (Some(content.clone()), None, None),
            Body::Binary { file_name, data } => {
                (None, Some(file_name.clone()), Some(data.len() as u64))
            }
        };

        MessageWire {
            id: Some(self.id.clone()),
            kind: self.kind().to_string(),
            content,
            file_name,
            file_size,
            sender_id: self.sender_id.clone(),
            receiver_id: self.receiver_id.clone(),
            room_id: self.room_id.clone(),
            timestamp: Some(self.timestamp),
        }
    }

    /// Rebuild a message from its wire fields. `raw` carries the payload of a
    /// binary envelope.
    pub(crate) fn from_wire(wire: MessageWire, raw: Option<&[u8]>) -> Result<Self, EnvelopeError> {
        let body = match wire.kind.as_str() {
            TEXT_TYPE => Body::Text {
                content: wire.content.ok_or(EnvelopeError::MissingField("content"))?,
            },
            BINARY_TYPE => Body::Binary {
                file_name: wire
                    .file_name
                    .ok_or(EnvelopeError::MissingField("fileName"))?,
                data: raw.map(<[u8]>::to_vec).unwrap_or_default(),
            },
            other => return Err(EnvelopeError::UnknownType(other.to_string())),
        };

        Ok(Self {
            id: wire
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            timestamp: wire.timestamp.unwrap_or_else(Utc::now),
            sender_id: wire.sender_id,
            receiver_id: wire.receiver_id,
            room_id: wire.room_id,
            body,
        })
    }

    /// JSON form. For binary messages this is the metadata only.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(&self.to_wire())?)
    }

    /// Bytes placed in a frame: JSON for text, `[len][metadata][raw]` for binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        match &self.body {
            Body::Text { .. } => Ok(self.to_json()?.into_bytes()),
            Body::Binary { data, .. } => {
                let metadata = serde_json::to_vec(&self.to_wire())?;
                Ok(write_prefixed(&metadata, data))
            }
        }
    }

    /// Decode a text message from JSON.
    pub fn from_json(json: &str) -> Result<Self, EnvelopeError> {
        let wire: MessageWire = serde_json::from_str(json)?;
        if wire.kind == BINARY_TYPE {
            return Err(EnvelopeError::BinaryInText);
        }
        Self::from_wire(wire, None)
    }

    /// Decode a binary message from the length-prefixed layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let (metadata, raw) = split_prefixed(bytes)?;
        let wire: MessageWire = serde_json::from_slice(metadata)?;
        Self::from_wire(wire, Some(raw))
    }
}
