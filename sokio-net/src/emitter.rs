//! Single-shot target resolution for outbound events.
//!
//! ```text
//! conn.emitter()                       ─┐
//!     .to_room("lobby")   (or to_socket)│ at most one target, last call wins
//!     .emit("chat", "hi")              ─┘ consumes the builder
//! ```
//!
//! Precedence on every event: receiver id, then room id, then local.

use std::sync::Arc;

use sokio_core::{Event, Message};

use crate::connection::Connection;
use crate::error::ConnectionError;

/// Explicit target chosen on an [`Emitter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Socket(String),
    Room(String),
}

/// Where an event goes, read off its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Only the connection with this id
    Socket(String),
    /// Every member of the room except the origin
    Room(String),
    /// No target: dispatch on the receiving side
    Local,
}

impl Route {
    pub fn resolve(message: &Message) -> Self {
        let non_empty = |field: &Option<String>| field.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

        if let Some(id) = non_empty(&message.receiver_id) {
            Route::Socket(id)
        } else if let Some(id) = non_empty(&message.room_id) {
            Route::Room(id)
        } else {
            Route::Local
        }
    }
}

/// Builder for one outbound event.
#[must_use = "an emitter does nothing until one of its emit methods is awaited"]
pub struct Emitter {
    origin: Arc<Connection>,
    target: Option<Target>,
}

impl Emitter {
    pub(crate) fn new(origin: Arc<Connection>) -> Self {
        Self {
            origin,
            target: None,
        }
    }

    pub fn to_socket(mut self, socket_id: impl Into<String>) -> Self {
        self.target = Some(Target::Socket(socket_id.into()));
        self
    }

    pub fn to_room(mut self, room_id: impl Into<String>) -> Self {
        self.target = Some(Target::Room(room_id.into()));
        self
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Emit a text event.
    pub async fn emit(self, name: &str, content: impl Into<String>) -> Result<(), ConnectionError> {
        let event = Event::new(name, Message::text(content))?;
        self.emit_event(event).await
    }

    /// Emit a binary event. The file name is randomized, its extension kept.
    pub async fn emit_binary(
        self,
        name: &str,
        file_name: &str,
        data: impl Into<Vec<u8>>,
    ) -> Result<(), ConnectionError> {
        let event = Event::new(name, Message::binary(file_name, data))?;
        self.emit_event(event).await
    }

    /// Emit a prepared event. The sender id is stamped when unset, and an
    /// explicit target replaces the event's own routing fields.
    pub async fn emit_event(self, mut event: Event) -> Result<(), ConnectionError> {
        let message = event.message_mut();
        if message.sender_id.is_none() {
            message.sender_id = Some(self.origin.id().to_string());
        }
        match self.target {
            Some(Target::Socket(id)) => {
                message.receiver_id = Some(id);
                message.room_id = None;
            }
            Some(Target::Room(id)) => {
                message.receiver_id = None;
                message.room_id = Some(id);
            }
            None => {}
        }

        self.origin.dispatch_outbound(event).await
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("origin", &self.origin.id())
            .field("target", &self.target)
            .finish()
    }
}
