//! Named events wrapping a [`Message`].

use super::{split_prefixed, write_prefixed, EventWire, Message, BINARY_TYPE};
use crate::error::EnvelopeError;

/// A message dispatched by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    name: String,
    message: Message,
}

impl Event {
    /// Wrap a message under `name`, which must be non-empty.
    pub fn new(name: impl Into<String>, message: Message) -> Result<Self, EnvelopeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(EnvelopeError::EmptyEventName);
        }
        Ok(Self { name, message })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    pub fn is_binary(&self) -> bool {
        self.message.is_binary()
    }

    fn to_wire(&self) -> EventWire {
        EventWire {
            event_name: self.name.clone(),
            message: self.message.to_wire(),
        }
    }

    /// `{"eventName": .., "message": {..}}`. Binary events yield metadata only.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(&self.to_wire())?)
    }

    /// Frame payload: JSON for text events, `[len][metadata][raw]` for binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        match self.message.data() {
            None => Ok(self.to_json()?.into_bytes()),
            Some(data) => {
                let metadata = serde_json::to_vec(&self.to_wire())?;
                Ok(write_prefixed(&metadata, data))
            }
        }
    }

    fn from_wire(wire: EventWire, raw: Option<&[u8]>) -> Result<Self, EnvelopeError> {
        if wire.event_name.is_empty() {
            return Err(EnvelopeError::EmptyEventName);
        }
        Ok(Self {
            name: wire.event_name,
            message: Message::from_wire(wire.message, raw)?,
        })
    }

    /// Decode a text event.
    pub fn from_text(json: &str) -> Result<Self, EnvelopeError> {
        let wire: EventWire = serde_json::from_str(json)?;
        if wire.message.kind == BINARY_TYPE {
            return Err(EnvelopeError::BinaryInText);
        }
        Self::from_wire(wire, None)
    }

    /// Decode a binary event.
    pub fn from_binary(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let (metadata, raw) = split_prefixed(bytes)?;
        let wire: EventWire = serde_json::from_slice(metadata)?;
        Self::from_wire(wire, Some(raw))
    }
}
