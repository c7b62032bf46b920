//! Shorthand constructors.

use super::{Event, Message};
use crate::error::EnvelopeError;

pub fn text_message(content: impl Into<String>) -> Message {
    Message::text(content)
}

/// Binary message; the file name is randomized, its extension kept.
pub fn binary_message(file_name: &str, data: impl Into<Vec<u8>>) -> Message {
    Message::binary(file_name, data)
}

pub fn event(name: impl Into<String>, message: Message) -> Result<Event, EnvelopeError> {
    Event::new(name, message)
}

pub fn text_event(
    name: impl Into<String>,
    content: impl Into<String>,
) -> Result<Event, EnvelopeError> {
    Event::new(name, Message::text(content))
}

pub fn binary_event(
    name: impl Into<String>,
    file_name: &str,
    data: impl Into<Vec<u8>>,
) -> Result<Event, EnvelopeError> {
    Event::new(name, Message::binary(file_name, data))
}
