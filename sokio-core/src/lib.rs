//! # sokio-core: WebSocket wire layer for sokio
//!
//! Pure, I/O-free building blocks shared by the client and server sides.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   HTTP Upgrade    ┌──────────────┐
//! │  handshake   │ ────────────────► │  101 + key   │
//! └──────────────┘                   └──────────────┘
//!
//! bytes ──► frame::Frame::decode ──► payload ──► envelope::Event
//!                                                     │
//! bytes ◄── frame::Frame::encode ◄── payload ◄────────┘
//! ```
//!
//! ## Modules
//!
//! - [`frame`]: RFC 6455 frame codec (masking, 7/16/64-bit lengths)
//! - [`handshake`]: Upgrade request/response and `Sec-WebSocket-Accept`
//! - [`envelope`]: Text/binary messages, events and their wire formats
//! - [`error`]: Error types for the three layers above

pub mod envelope;
pub mod error;
pub mod frame;
pub mod handshake;

// Re-exports for convenience
pub use envelope::{factory, Body, Envelope, Event, Message, JOIN_ROOM_EVENT, LEAVE_ROOM_EVENT};
pub use error::{EnvelopeError, FrameError, HandshakeError};
pub use frame::{apply_mask, Frame, FrameHeader, OpCode};
pub use handshake::{compute_accept_key, ClientRequest, UpgradeRequest};
