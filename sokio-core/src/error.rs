//! Error types for the wire layer.
//!
//! - [`FrameError`] is fatal to a connection.
//! - [`HandshakeError`] is fatal to a connection attempt.
//! - [`EnvelopeError`] only ever costs the one payload that failed to decode.

use thiserror::Error;

/// Frame-level protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("insufficient header: need at least 2 bytes, got {0}")]
    InsufficientHeader(usize),

    #[error("truncated extended length: need {needed} bytes, got {available}")]
    TruncatedLength { needed: usize, available: usize },

    #[error("truncated mask key: need {needed} bytes, got {available}")]
    TruncatedMask { needed: usize, available: usize },

    #[error("truncated payload: announced {announced} bytes, got {available}")]
    TruncatedPayload { announced: u64, available: usize },

    #[error("unknown opcode: {0:#x}")]
    UnknownOpcode(u8),

    #[error("frame too large: {actual} bytes (max {max})")]
    TooLarge { max: usize, actual: u64 },
}

impl FrameError {
    /// Whether more bytes could turn this error into a complete frame.
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            Self::InsufficientHeader(_)
                | Self::TruncatedLength { .. }
                | Self::TruncatedMask { .. }
                | Self::TruncatedPayload { .. }
        )
    }
}

/// HTTP Upgrade handshake errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("handshake is not valid UTF-8")]
    InvalidUtf8,

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("handshake rejected: {0}")]
    Rejected(String),

    #[error("handshake exceeds {0} bytes")]
    TooLarge(usize),

    #[error("connection closed during handshake")]
    Closed,

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Message and event envelope errors.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("binary envelope too short: {0} bytes")]
    TooShort(usize),

    #[error("invalid metadata length {length} for {available} available bytes")]
    InvalidMetadataLength { length: u32, available: usize },

    #[error("event name must not be empty")]
    EmptyEventName,

    #[error("binary message received as text")]
    BinaryInText,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_display() {
        let err = FrameError::TooLarge { max: 1024, actual: 2048 };
        let msg = err.to_string();
        assert!(msg.contains("2048"));
        assert!(msg.contains("1024"));

        assert!(FrameError::UnknownOpcode(0x3).to_string().contains("0x3"));
    }

    #[test]
    fn test_incomplete_classification() {
        assert!(FrameError::InsufficientHeader(1).is_incomplete());
        assert!(FrameError::TruncatedLength { needed: 4, available: 2 }.is_incomplete());
        assert!(FrameError::TruncatedMask { needed: 6, available: 3 }.is_incomplete());
        assert!(FrameError::TruncatedPayload { announced: 10, available: 2 }.is_incomplete());
        assert!(!FrameError::UnknownOpcode(0x3).is_incomplete());
        assert!(!FrameError::TooLarge { max: 1, actual: 2 }.is_incomplete());
    }

    #[test]
    fn test_envelope_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: EnvelopeError = json_err.into();
        assert!(matches!(err, EnvelopeError::Json(_)));
    }
}
