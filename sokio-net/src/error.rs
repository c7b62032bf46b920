//! Connection and server errors.

use std::io;

use sokio_core::{EnvelopeError, FrameError, HandshakeError};
use thiserror::Error;

use crate::storage::StoreError;

/// Errors raised on a single connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Send attempted on a connection that is not open. Tears nothing down.
    #[error("connection is not open")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
}

impl ConnectionError {
    /// Whether this error ends the connection.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NotConnected | Self::Envelope(_))
    }
}

/// Errors surfaced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("server is already listening")]
    AlreadyListening,

    #[error("accept failed: {0}")]
    Accept(io::Error),

    #[error("connection from {peer} failed: {source}")]
    Connection {
        peer: String,
        source: ConnectionError,
    },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(!ConnectionError::NotConnected.is_fatal());
        assert!(ConnectionError::Frame(FrameError::UnknownOpcode(3)).is_fatal());
        assert!(ConnectionError::Transport(io::Error::from(io::ErrorKind::BrokenPipe)).is_fatal());
        assert!(!ConnectionError::Envelope(EnvelopeError::EmptyEventName).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = ServerError::Connection {
            peer: "127.0.0.1:5000".into(),
            source: HandshakeError::MissingKey.into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:5000"));
        assert!(msg.contains("Sec-WebSocket-Key"));
    }
}
