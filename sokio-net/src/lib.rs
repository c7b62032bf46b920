//! # sokio-net: Connections, rooms and event routing for sokio
//!
//! Runs the wire layer from `sokio-core` over async streams and adds
//! socket.io-style named events and rooms on top.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket       ┌─────────────┐
//! │   Client    │ ◄─────────────────► │   Server    │
//! │ (Connection │   text / binary     │ (accept +   │
//! │  Role::     │   event frames      │  Registry)  │
//! │  Client)    │                     └──────┬──────┘
//! └─────────────┘                            │
//!                                    ┌───────┴────────┐
//!                                    │ Emitter route  │
//!                                    │ socket > room  │
//!                                    │ > local        │
//!                                    └───────┬────────┘
//!                          ┌─────────────────┼─────────────────┐
//!                          ▼                 ▼                 ▼
//!                     one socket      room members       CallbackRouter
//!                                     (minus sender)     (local handlers)
//! ```
//!
//! ## Modules
//!
//! - [`connection`]: Per-stream state machine, receive loop, send path
//! - [`registry`]: Live connections and rooms
//! - [`emitter`]: Target resolution for outbound events
//! - [`callback`]: Event name → handler table
//! - [`server`]: Accept loop, observers, broadcast
//! - [`client`]: `ws://` URLs and outbound connects
//! - [`storage`]: Persistence for received binary payloads

pub mod callback;
pub mod client;
pub mod connection;
pub mod emitter;
pub mod error;
pub mod registry;
pub mod server;
pub mod storage;

// Re-exports for convenience
pub use callback::{CallbackRouter, Handler};
pub use client::{Client, WsUrl};
pub use connection::{Connection, ConnectionConfig, ConnectionState, Role, Transport};
pub use emitter::{Emitter, Route, Target};
pub use error::{ConnectionError, ServerError};
pub use registry::{Registry, Room};
pub use server::{Server, ServerConfig, ServerStats};
pub use storage::{BinaryFileStore, MemoryStore, Persistence, StoreError};

pub use sokio_core::{factory, Envelope, Event, Message};
