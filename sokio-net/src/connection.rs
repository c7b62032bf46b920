//! One WebSocket connection over any async byte stream.
//!
//! ```text
//!  Connecting ──handshake ok──► Open ──close() / Close frame──► Closing ──► Closed
//!                                 │                                           ▲
//!                                 └──── EOF / I/O error / frame error ────────┘
//! ```
//!
//! The receive loop owns the read half and runs until the connection leaves
//! `Open`. Writes go through one async mutex, so every frame reaches the
//! stream whole. Every path into `Closed` runs the same teardown: shut the
//! write half, leave the registry, fire close observers once, then drop all
//! observers and handlers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex as SyncMutex;
use sokio_core::handshake::{self, ClientRequest, UpgradeRequest};
use sokio_core::{
    factory, Envelope, Event, Frame, FrameError, FrameHeader, HandshakeError, Message, OpCode,
    JOIN_ROOM_EVENT, LEAVE_ROOM_EVENT,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::callback::CallbackRouter;
use crate::emitter::{Emitter, Route};
use crate::error::ConnectionError;
use crate::registry::Registry;
use crate::storage::Persistence;

/// Which end of the connection this side is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// Clients mask every outbound frame; servers never do.
    pub fn masks_outbound(self) -> bool {
        matches!(self, Role::Client)
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Per-connection limits.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Size of the buffer each read fills
    pub read_buffer_size: usize,
    /// Largest accepted frame payload in bytes
    pub max_frame_size: usize,
    /// Largest accepted handshake header block in bytes
    pub max_handshake_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 4096,
            max_frame_size: 16 * 1024 * 1024, // 16 MiB
            max_handshake_size: 8192,
        }
    }
}

/// Any duplex byte stream a connection can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Transport for T {}

type Reader = Box<dyn AsyncRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

type MessageObserver = Arc<dyn Fn(&Envelope) + Send + Sync>;
type CloseObserver = Arc<dyn Fn() + Send + Sync>;
type ErrorObserver = Arc<dyn Fn(&ConnectionError) + Send + Sync>;
type RoomObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Read half plus bytes already read but not yet parsed.
struct ReadSide {
    reader: Reader,
    pending: Vec<u8>,
}

#[derive(Default)]
struct Observers {
    message: SyncMutex<Vec<MessageObserver>>,
    close: SyncMutex<Vec<CloseObserver>>,
    error: SyncMutex<Vec<ErrorObserver>>,
    room_join: SyncMutex<Vec<RoomObserver>>,
    room_leave: SyncMutex<Vec<RoomObserver>>,
}

impl Observers {
    fn clear(&self) {
        self.message.lock().clear();
        self.close.lock().clear();
        self.error.lock().clear();
        self.room_join.lock().clear();
        self.room_leave.lock().clear();
    }
}

/// Clone the list so observers run without the lock held.
fn snapshot<T: Clone>(list: &SyncMutex<Vec<T>>) -> Vec<T> {
    list.lock().clone()
}

/// A WebSocket connection.
pub struct Connection {
    id: String,
    role: Role,
    config: ConnectionConfig,
    state: RwLock<ConnectionState>,
    writer: Mutex<Writer>,
    /// Taken by the receive loop on start
    read_side: Mutex<Option<ReadSide>>,
    rooms: SyncMutex<HashSet<String>>,
    router: CallbackRouter,
    observers: Observers,
    /// Present on server-side connections owned by a server
    registry: Option<Arc<Registry>>,
    persistence: SyncMutex<Option<Arc<dyn Persistence>>>,
    failed: AtomicBool,
    torn_down: AtomicBool,
}

impl Connection {
    fn with_parts<S: Transport>(
        stream: S,
        role: Role,
        config: ConnectionConfig,
        registry: Option<Arc<Registry>>,
        state: ConnectionState,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            config,
            state: RwLock::new(state),
            writer: Mutex::new(Box::new(writer)),
            read_side: Mutex::new(Some(ReadSide {
                reader: Box::new(reader),
                pending: Vec::new(),
            })),
            rooms: SyncMutex::new(HashSet::new()),
            router: CallbackRouter::new(),
            observers: Observers::default(),
            registry,
            persistence: SyncMutex::new(None),
            failed: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Wrap a stream whose upgrade handshake has already completed.
    pub fn upgraded<S: Transport>(stream: S, role: Role, config: ConnectionConfig) -> Self {
        Self::with_parts(stream, role, config, None, ConnectionState::Open)
    }

    /// Run the server side of the handshake on `stream`.
    ///
    /// The returned connection is open but not yet receiving; register
    /// handlers, then call [`Connection::start`].
    pub async fn accept<S: Transport>(
        stream: S,
        config: ConnectionConfig,
    ) -> Result<Arc<Self>, ConnectionError> {
        Self::accept_in(stream, config, None).await
    }

    pub(crate) async fn accept_in<S: Transport>(
        stream: S,
        config: ConnectionConfig,
        registry: Option<Arc<Registry>>,
    ) -> Result<Arc<Self>, ConnectionError> {
        let conn = Self::with_parts(stream, Role::Server, config, registry, ConnectionState::Connecting);
        conn.server_handshake().await?;
        Ok(Arc::new(conn))
    }

    /// Run the client side of the handshake on `stream`.
    ///
    /// `host` is sent as the `Host` header. The returned connection is open
    /// but not yet receiving.
    pub async fn connect<S: Transport>(
        stream: S,
        host: &str,
        path: &str,
        config: ConnectionConfig,
    ) -> Result<Arc<Self>, ConnectionError> {
        let conn = Self::with_parts(stream, Role::Client, config, None, ConnectionState::Connecting);
        conn.client_handshake(&ClientRequest::new(host, path)).await?;
        Ok(Arc::new(conn))
    }

    async fn server_handshake(&self) -> Result<(), ConnectionError> {
        let mut guard = self.read_side.lock().await;
        let side = guard.as_mut().ok_or(ConnectionError::NotConnected)?;

        let request = match read_head(side, self.config.max_handshake_size)
            .await
            .and_then(|head| UpgradeRequest::parse(&head).map_err(ConnectionError::from))
        {
            Ok(request) => request,
            Err(e) => {
                let status = match &e {
                    ConnectionError::Handshake(HandshakeError::TooLarge(_)) => Some(431),
                    ConnectionError::Handshake(HandshakeError::Closed) => None,
                    ConnectionError::Transport(_) => None,
                    _ => Some(400),
                };
                if let Some(status) = status {
                    let response = handshake::error_response(status, &e.to_string());
                    // The peer may already be gone
                    let _ = self.write_raw(response.as_bytes()).await;
                }
                *self.state.write().await = ConnectionState::Closed;
                return Err(e);
            }
        };

        self.write_raw(request.response().as_bytes()).await?;
        *self.state.write().await = ConnectionState::Open;

        log::info!(
            "Connection {} upgraded on {}",
            self.id,
            request.path.as_deref().unwrap_or("/")
        );
        Ok(())
    }

    async fn client_handshake(&self, request: &ClientRequest) -> Result<(), ConnectionError> {
        self.write_raw(request.to_http().as_bytes()).await?;

        let mut guard = self.read_side.lock().await;
        let side = guard.as_mut().ok_or(ConnectionError::NotConnected)?;
        let head = read_head(side, self.config.max_handshake_size).await?;

        let raw = std::str::from_utf8(&head).map_err(|_| HandshakeError::InvalidUtf8)?;
        handshake::verify_response(raw)?;

        let headers = handshake::parse_headers(raw);
        if headers.get("sec-websocket-accept") != Some(&request.expected_accept()) {
            log::warn!("Server at {} sent an unexpected Sec-WebSocket-Accept", request.host);
        }

        *self.state.write().await = ConnectionState::Open;
        log::info!("Connection {} opened to {}{}", self.id, request.host, request.path);
        Ok(())
    }

    /// Spawn the receive loop. Returns `false` if it was already started.
    pub fn start(self: &Arc<Self>) -> bool {
        let side = match self.read_side.try_lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(side) = side else {
            return false;
        };

        let conn = Arc::clone(self);
        tokio::spawn(async move { conn.receive_loop(side).await });
        true
    }

    async fn receive_loop(self: Arc<Self>, side: ReadSide) {
        let ReadSide {
            mut reader,
            mut pending,
        } = side;
        let mut buf = vec![0u8; self.config.read_buffer_size.max(1)];

        match self.pump(&mut reader, &mut pending, &mut buf).await {
            Ok(()) => {}
            Err(e) if self.state().await == ConnectionState::Open => self.fail(&e).await,
            Err(e) => log::debug!("Connection {} read ended during close: {e}", self.id),
        }
        self.teardown().await;
    }

    /// Read and dispatch frames until the stream ends or a Close frame arrives.
    async fn pump(
        self: &Arc<Self>,
        reader: &mut Reader,
        pending: &mut Vec<u8>,
        buf: &mut [u8],
    ) -> Result<(), ConnectionError> {
        loop {
            while let Some(frame) = self.next_frame(pending)? {
                if !self.handle_frame(frame).await? {
                    return Ok(());
                }
            }

            let n = reader.read(buf).await?;
            if n == 0 {
                log::debug!("Connection {} reached end of stream", self.id);
                return Ok(());
            }
            pending.extend_from_slice(&buf[..n]);
        }
    }

    /// Split the first complete frame off `pending`.
    fn next_frame(&self, pending: &mut Vec<u8>) -> Result<Option<Frame>, ConnectionError> {
        let max = self.config.max_frame_size;
        if let Ok(header) = FrameHeader::parse(pending) {
            if header.payload_len > max as u64 {
                return Err(FrameError::TooLarge {
                    max,
                    actual: header.payload_len,
                }
                .into());
            }
        }

        let Some(len) = Frame::frame_len(pending)? else {
            return Ok(None);
        };
        let frame = Frame::decode(&pending[..len])?;
        pending.drain(..len);
        Ok(Some(frame))
    }

    /// Handle one frame. Returns `false` once the loop should stop.
    async fn handle_frame(self: &Arc<Self>, frame: Frame) -> Result<bool, ConnectionError> {
        log::trace!(
            "Connection {} received {:?} frame ({} bytes)",
            self.id,
            frame.opcode,
            frame.payload.len()
        );

        match frame.opcode {
            OpCode::Text => {
                let decoded = frame
                    .text_payload()
                    .map_err(|_| sokio_core::EnvelopeError::InvalidUtf8)
                    .and_then(Envelope::from_text);
                match decoded {
                    Ok(envelope) => self.dispatch_inbound(envelope).await,
                    Err(e) => log::warn!("Dropping text frame on {}: {e}", self.id),
                }
                Ok(true)
            }
            OpCode::Binary => {
                match Envelope::from_binary(&frame.payload) {
                    Ok(envelope) => {
                        self.persist_payload(envelope.message()).await;
                        self.dispatch_inbound(envelope).await;
                    }
                    Err(e) => log::warn!("Dropping binary frame on {}: {e}", self.id),
                }
                Ok(true)
            }
            OpCode::Close => {
                let was_open = {
                    let mut state = self.state.write().await;
                    let open = *state == ConnectionState::Open;
                    if open {
                        *state = ConnectionState::Closing;
                    }
                    open
                };
                if was_open {
                    if let Err(e) = self.write_frame(&Frame::close()).await {
                        log::debug!("Close reply on {} failed: {e}", self.id);
                    }
                }
                Ok(false)
            }
            OpCode::Ping => {
                self.write_frame(&Frame::pong(frame.payload)).await?;
                Ok(true)
            }
            OpCode::Pong => Ok(true),
            OpCode::Continuation => {
                log::warn!("Ignoring continuation frame on {}", self.id);
                Ok(true)
            }
        }
    }

    async fn persist_payload(&self, message: &Message) {
        let store = self.persistence.lock().clone();
        let Some(store) = store else {
            return;
        };
        let (Some(name), Some(data)) = (message.file_name(), message.data()) else {
            return;
        };

        let file_name = name.to_string();
        let task_name = file_name.clone();
        let data = data.to_vec();
        match tokio::task::spawn_blocking(move || store.write(&task_name, &data)).await {
            Ok(Ok(())) => log::debug!("Persisted {file_name} from {}", self.id),
            Ok(Err(e)) => log::warn!("Failed to persist {file_name} from {}: {e}", self.id),
            Err(e) => log::warn!("Persistence task for {file_name} failed: {e}"),
        }
    }

    async fn dispatch_inbound(self: &Arc<Self>, envelope: Envelope) {
        for observer in snapshot(&self.observers.message) {
            observer(&envelope);
        }

        let Envelope::Event(event) = envelope else {
            return;
        };

        if self.role == Role::Client {
            self.run_handlers(&event);
            return;
        }
        if self.handle_reserved(&event).await {
            return;
        }

        match Route::resolve(event.message()) {
            Route::Socket(id) => {
                self.forward_direct(&id, event).await;
            }
            Route::Room(id) => {
                self.forward_room(&id, &event).await;
            }
            Route::Local => self.run_handlers(&event),
        }
    }

    fn run_handlers(&self, event: &Event) {
        if self.router.execute(event) == 0 {
            log::debug!("No handler for event {} on {}", event.name(), self.id);
        }
    }

    /// Membership events sent by clients. Returns `true` if handled.
    async fn handle_reserved(&self, event: &Event) -> bool {
        let room = event.message().content().unwrap_or_default();
        let joining = match event.name() {
            JOIN_ROOM_EVENT => true,
            LEAVE_ROOM_EVENT => false,
            _ => return false,
        };

        if room.is_empty() {
            log::warn!("Ignoring {} without a room id from {}", event.name(), self.id);
        } else if joining {
            self.enter_room(room).await;
        } else {
            self.exit_room(room).await;
        }
        true
    }

    /// Route an outbound event built by an [`Emitter`].
    pub(crate) async fn dispatch_outbound(self: &Arc<Self>, event: Event) -> Result<(), ConnectionError> {
        self.ensure_open().await?;

        match (self.role, Route::resolve(event.message())) {
            (Role::Client, _) | (Role::Server, Route::Local) => self.send_event(&event).await,
            (Role::Server, Route::Socket(id)) => {
                self.forward_direct(&id, event).await;
                Ok(())
            }
            (Role::Server, Route::Room(id)) => {
                self.forward_room(&id, &event).await;
                Ok(())
            }
        }
    }

    /// Deliver to one connection, clearing the receiver id first.
    async fn forward_direct(&self, target_id: &str, mut event: Event) -> bool {
        let target = match &self.registry {
            Some(registry) => registry.lookup(target_id).await,
            None => None,
        };
        let Some(target) = target else {
            log::debug!("No connection {target_id}; dropping event {}", event.name());
            return false;
        };

        event.message_mut().receiver_id = None;
        match target.send_event(&event).await {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Direct send of {} to {target_id} failed: {e}", event.name());
                false
            }
        }
    }

    /// Deliver to every room member except this connection, concurrently.
    async fn forward_room(&self, room_id: &str, event: &Event) -> usize {
        let Some(registry) = &self.registry else {
            log::debug!("No registry on {}; dropping room event {}", self.id, event.name());
            return 0;
        };

        let members: Vec<Arc<Connection>> = registry
            .members_of(room_id)
            .await
            .into_iter()
            .filter(|member| member.id != self.id)
            .collect();
        if members.is_empty() {
            log::debug!("Room {room_id} has no other members; dropping {}", event.name());
            return 0;
        }

        let results = join_all(members.iter().map(|member| member.send_event(event))).await;
        let delivered = results.iter().filter(|r| r.is_ok()).count();
        log::debug!(
            "Event {} to room {room_id}: {delivered}/{} delivered",
            event.name(),
            members.len()
        );
        delivered
    }

    async fn enter_room(&self, room_id: &str) {
        let joined = match &self.registry {
            Some(registry) => {
                let joined = registry.join(room_id, self).await;
                // Teardown may have swept the registry while we were joining
                if self.torn_down.load(Ordering::SeqCst) {
                    registry.leave(room_id, self).await;
                    return;
                }
                joined
            }
            None => self.record_room(room_id),
        };
        if joined {
            for observer in snapshot(&self.observers.room_join) {
                observer(room_id);
            }
        }
    }

    async fn exit_room(&self, room_id: &str) {
        let left = match &self.registry {
            Some(registry) => registry.leave(room_id, self).await,
            None => self.forget_room(room_id),
        };
        if left {
            for observer in snapshot(&self.observers.room_leave) {
                observer(room_id);
            }
        }
    }

    /// Join a room. Servers update the registry directly; clients ask the
    /// server with a `join-room` event. Fails with `NotConnected` unless open.
    pub async fn join_room(&self, room_id: &str) -> Result<(), ConnectionError> {
        self.ensure_open().await?;
        match self.role {
            Role::Server => self.enter_room(room_id).await,
            Role::Client => {
                self.send_event(&factory::text_event(JOIN_ROOM_EVENT, room_id)?).await?;
                self.enter_room(room_id).await;
            }
        }
        Ok(())
    }

    /// Leave a room. Clients send a `leave-room` event.
    pub async fn leave_room(&self, room_id: &str) -> Result<(), ConnectionError> {
        self.ensure_open().await?;
        match self.role {
            Role::Server => self.exit_room(room_id).await,
            Role::Client => {
                self.send_event(&factory::text_event(LEAVE_ROOM_EVENT, room_id)?).await?;
                self.exit_room(room_id).await;
            }
        }
        Ok(())
    }

    pub(crate) fn record_room(&self, room_id: &str) -> bool {
        self.rooms.lock().insert(room_id.to_string())
    }

    pub(crate) fn forget_room(&self, room_id: &str) -> bool {
        self.rooms.lock().remove(room_id)
    }

    // ── Sending ──────────────────────────────────────────────────────────

    async fn ensure_open(&self) -> Result<(), ConnectionError> {
        if *self.state.read().await == ConnectionState::Open {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected)
        }
    }

    async fn write_raw(&self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn write_frame(&self, frame: &Frame) -> Result<(), ConnectionError> {
        let bytes = frame.encode(self.role.masks_outbound());
        log::trace!(
            "Connection {} sending {:?} frame ({} bytes)",
            self.id,
            frame.opcode,
            frame.payload.len()
        );
        self.write_raw(&bytes).await
    }

    /// Write a frame on an open connection. Write failures are fatal.
    async fn send_frame(&self, frame: Frame) -> Result<(), ConnectionError> {
        self.ensure_open().await?;
        if let Err(e) = self.write_frame(&frame).await {
            self.fail(&e).await;
            return Err(e);
        }
        Ok(())
    }

    pub async fn send_text(&self, text: &str) -> Result<(), ConnectionError> {
        self.send_frame(Frame::text(text)).await
    }

    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<(), ConnectionError> {
        self.send_frame(Frame::binary(data)).await
    }

    /// Send a bare message, stamping this connection as sender when unset.
    pub async fn send_message(&self, mut message: Message) -> Result<(), ConnectionError> {
        if message.sender_id.is_none() {
            message.sender_id = Some(self.id.clone());
        }
        let opcode = if message.is_binary() { OpCode::Binary } else { OpCode::Text };
        self.send_frame(Frame::new(opcode, message.to_bytes()?)).await
    }

    /// Send an event to this connection's peer, as is.
    pub async fn send_event(&self, event: &Event) -> Result<(), ConnectionError> {
        let opcode = if event.is_binary() { OpCode::Binary } else { OpCode::Text };
        self.send_frame(Frame::new(opcode, event.to_bytes()?)).await
    }

    pub async fn ping(&self, payload: impl Into<Vec<u8>>) -> Result<(), ConnectionError> {
        self.send_frame(Frame::ping(payload)).await
    }

    // ── Emitting ─────────────────────────────────────────────────────────

    pub fn emitter(self: &Arc<Self>) -> Emitter {
        Emitter::new(Arc::clone(self))
    }

    pub fn to_room(self: &Arc<Self>, room_id: impl Into<String>) -> Emitter {
        self.emitter().to_room(room_id)
    }

    pub fn to_socket(self: &Arc<Self>, socket_id: impl Into<String>) -> Emitter {
        self.emitter().to_socket(socket_id)
    }

    /// Emit a text event with no explicit target.
    pub async fn emit(self: &Arc<Self>, name: &str, content: impl Into<String>) -> Result<(), ConnectionError> {
        self.emitter().emit(name, content).await
    }

    pub async fn emit_binary(
        self: &Arc<Self>,
        name: &str,
        file_name: &str,
        data: impl Into<Vec<u8>>,
    ) -> Result<(), ConnectionError> {
        self.emitter().emit_binary(name, file_name, data).await
    }

    // ── Closing ──────────────────────────────────────────────────────────

    /// Send a Close frame and tear down. Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        {
            let mut state = self.state.write().await;
            if *state != ConnectionState::Open {
                return Ok(());
            }
            *state = ConnectionState::Closing;
        }

        log::debug!("Closing connection {}", self.id);
        let result = self.write_frame(&Frame::close()).await;
        self.teardown().await;
        result
    }

    /// Fire error observers (once per connection), then tear down.
    async fn fail(&self, err: &ConnectionError) {
        if !self.failed.swap(true, Ordering::SeqCst) {
            log::error!("Connection {} failed: {err}", self.id);
            for observer in snapshot(&self.observers.error) {
                observer(err);
            }
        }
        self.teardown().await;
    }

    async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.write().await = ConnectionState::Closed;

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                log::trace!("Shutdown of {} write half failed: {e}", self.id);
            }
        }

        if let Some(registry) = &self.registry {
            registry.remove_connection(&self.id).await;
        }
        self.rooms.lock().clear();

        log::info!("Connection {} closed", self.id);
        for observer in snapshot(&self.observers.close) {
            observer();
        }

        // Handlers may hold the connection itself
        self.observers.clear();
        self.router.clear_all();
    }

    // ── Observers ────────────────────────────────────────────────────────

    /// Register a handler for a named event.
    pub fn on(&self, name: impl Into<String>, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.router.register(name, handler);
    }

    /// Observe every decoded inbound message or event.
    pub fn on_message(&self, observer: impl Fn(&Envelope) + Send + Sync + 'static) {
        self.observers.message.lock().push(Arc::new(observer));
    }

    pub fn on_close(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.observers.close.lock().push(Arc::new(observer));
    }

    pub fn on_error(&self, observer: impl Fn(&ConnectionError) + Send + Sync + 'static) {
        self.observers.error.lock().push(Arc::new(observer));
    }

    pub fn on_room_join(&self, observer: impl Fn(&str) + Send + Sync + 'static) {
        self.observers.room_join.lock().push(Arc::new(observer));
    }

    pub fn on_room_leave(&self, observer: impl Fn(&str) + Send + Sync + 'static) {
        self.observers.room_leave.lock().push(Arc::new(observer));
    }

    /// Hand received binary payloads to `store`.
    pub fn persist(&self, store: Arc<dyn Persistence>) {
        *self.persistence.lock() = Some(store);
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_open(&self) -> bool {
        self.state().await == ConnectionState::Open
    }

    /// Rooms this connection has joined, sorted.
    pub fn rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.rooms.lock().iter().cloned().collect();
        rooms.sort();
        rooms
    }

    pub fn router(&self) -> &CallbackRouter {
        &self.router
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role)
            .finish()
    }
}

/// Read until the blank line ending an HTTP header block. Bytes past it stay
/// in `side.pending` for the receive loop.
async fn read_head(side: &mut ReadSide, max: usize) -> Result<Vec<u8>, ConnectionError> {
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(end) = handshake::header_end(&side.pending) {
            let rest = side.pending.split_off(end);
            return Ok(std::mem::replace(&mut side.pending, rest));
        }
        if side.pending.len() >= max {
            return Err(HandshakeError::TooLarge(max).into());
        }

        let n = side.reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(HandshakeError::Closed.into());
        }
        side.pending.extend_from_slice(&chunk[..n]);
    }
}
