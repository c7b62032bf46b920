//! WebSocket server with event and room routing.
//!
//! Architecture:
//! ```text
//! TcpListener ──accept──► handshake ──► Connection (Role::Server)
//!                                           │
//!                           ┌───────────────┼────────────────┐
//!                           ▼               ▼                ▼
//!                       Registry       Persistence     on_connection
//!                    (ids + rooms)   (binary payloads)    observers
//!                           │
//!             ┌─────────────┼──────────────┐
//!             ▼             ▼              ▼
//!         Client A      Client B       Client C
//! ```
//!
//! Each accepted stream is upgraded on its own task, so a slow handshake
//! never blocks the accept loop. Once upgraded, a connection is registered,
//! handed to the `on_connection` observers, and only then starts receiving.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use sokio_core::Event;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ServerError;
use crate::registry::Registry;
use crate::storage::{BinaryFileStore, Persistence};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (port 0 picks a free port)
    pub bind_addr: String,
    /// Size of each connection's read buffer
    pub read_buffer_size: usize,
    /// Largest accepted frame payload in bytes
    pub max_frame_size: usize,
    /// Largest accepted handshake header block in bytes
    pub max_handshake_size: usize,
    /// Directory for received binary payloads (None = not persisted)
    pub storage_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let conn = ConnectionConfig::default();
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            read_buffer_size: conn.read_buffer_size,
            max_frame_size: conn.max_frame_size,
            max_handshake_size: conn.max_handshake_size,
            storage_path: None,
        }
    }
}

impl ServerConfig {
    /// Config with binary payloads stored under `path`.
    pub fn with_storage(bind_addr: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            storage_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Limits applied to every accepted connection.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            read_buffer_size: self.read_buffer_size,
            max_frame_size: self.max_frame_size,
            max_handshake_size: self.max_handshake_size,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub active_rooms: usize,
    pub handshake_failures: u64,
    pub broadcasts: u64,
}

#[derive(Default)]
struct Counters {
    total_connections: AtomicU64,
    handshake_failures: AtomicU64,
    broadcasts: AtomicU64,
}

type ConnectionObserver = Arc<dyn Fn(&Arc<Connection>) + Send + Sync>;
type ErrorObserver = Arc<dyn Fn(&ServerError) + Send + Sync>;

#[derive(Default)]
struct ServerObservers {
    connection: Mutex<Vec<ConnectionObserver>>,
    error: Mutex<Vec<ErrorObserver>>,
}

impl ServerObservers {
    fn notify_connection(&self, conn: &Arc<Connection>) {
        let observers = self.connection.lock().clone();
        for observer in observers {
            observer(conn);
        }
    }

    fn notify_error(&self, err: &ServerError) {
        log::warn!("{err}");
        let observers = self.error.lock().clone();
        for observer in observers {
            observer(err);
        }
    }
}

/// State shared between the server handle and its accept loop.
struct Shared {
    config: ConnectionConfig,
    registry: Arc<Registry>,
    persistence: Option<Arc<dyn Persistence>>,
    observers: ServerObservers,
    counters: Counters,
    /// Set by `stop`; upgrades finishing afterwards are closed, not registered
    stopped: AtomicBool,
}

/// The WebSocket server.
pub struct Server {
    bind_addr: String,
    shared: Arc<Shared>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Server {
    /// Create a server. Opens the payload store when `storage_path` is set.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let persistence = match &config.storage_path {
            Some(path) => {
                let store = BinaryFileStore::open(path)?;
                log::info!("Storing binary payloads in {}", path.display());
                Some(Arc::new(store) as Arc<dyn Persistence>)
            }
            None => None,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                config: config.connection_config(),
                registry: Arc::new(Registry::new()),
                persistence,
                observers: ServerObservers::default(),
                counters: Counters::default(),
                stopped: AtomicBool::new(false),
            }),
            bind_addr: config.bind_addr,
            accept_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        })
    }

    /// Create with persistence at the given path.
    pub fn with_storage(bind_addr: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self, ServerError> {
        Self::new(ServerConfig::with_storage(bind_addr, path))
    }

    /// Replace the payload store. Call before [`Server::listen`].
    pub fn with_persistence(mut self, store: Arc<dyn Persistence>) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.persistence = Some(store),
            None => log::warn!("Server already listening; persistence unchanged"),
        }
        self
    }

    /// Observe every upgraded connection before it starts receiving.
    pub fn on_connection(&self, observer: impl Fn(&Arc<Connection>) + Send + Sync + 'static) {
        self.shared.observers.connection.lock().push(Arc::new(observer));
    }

    /// Observe accept and handshake failures.
    pub fn on_error(&self, observer: impl Fn(&ServerError) + Send + Sync + 'static) {
        self.shared.observers.error.lock().push(Arc::new(observer));
    }

    /// Bind and start accepting in the background. Returns the bound address.
    pub async fn listen(&self) -> Result<SocketAddr, ServerError> {
        if self.accept_task.lock().is_some() {
            return Err(ServerError::AlreadyListening);
        }

        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.bind_addr.clone(),
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: self.bind_addr.clone(),
            source,
        })?;

        let mut task = self.accept_task.lock();
        if task.is_some() {
            return Err(ServerError::AlreadyListening);
        }
        self.shared.stopped.store(false, Ordering::SeqCst);
        *task = Some(tokio::spawn(accept_loop(listener, Arc::clone(&self.shared))));
        *self.local_addr.lock() = Some(addr);

        log::info!("Server listening on {addr}");
        Ok(addr)
    }

    /// Stop accepting and close every connection. Handshakes still in
    /// progress are abandoned.
    pub async fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        *self.local_addr.lock() = None;

        let connections = self.shared.registry.connections().await;
        let count = connections.len();
        join_all(connections.iter().map(|conn| conn.close())).await;
        log::info!("Server stopped; closed {count} connections");
    }

    /// Send a text frame to every open connection. Returns how many succeeded.
    pub async fn broadcast_text(&self, text: &str) -> usize {
        let connections = self.shared.registry.connections().await;
        let results = join_all(connections.iter().map(|conn| conn.send_text(text))).await;
        self.count_broadcast(results)
    }

    /// Send a binary frame to every open connection.
    pub async fn broadcast_binary(&self, data: &[u8]) -> usize {
        let connections = self.shared.registry.connections().await;
        let results = join_all(connections.iter().map(|conn| conn.send_binary(data))).await;
        self.count_broadcast(results)
    }

    /// Send an event to every open connection, as is.
    pub async fn broadcast_event(&self, event: &Event) -> usize {
        let connections = self.shared.registry.connections().await;
        let results = join_all(connections.iter().map(|conn| conn.send_event(event))).await;
        self.count_broadcast(results)
    }

    fn count_broadcast<E: std::fmt::Display>(&self, results: Vec<Result<(), E>>) -> usize {
        self.shared.counters.broadcasts.fetch_add(1, Ordering::Relaxed);
        let delivered = results.iter().filter(|r| r.is_ok()).count();
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            log::debug!("Broadcast send failed: {err}");
        }
        log::debug!("Broadcast delivered to {delivered}/{} connections", results.len());
        delivered
    }

    /// Snapshot of every live connection.
    pub async fn connections(&self) -> Vec<Arc<Connection>> {
        self.shared.registry.connections().await
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.shared.registry
    }

    pub async fn stats(&self) -> ServerStats {
        let counters = &self.shared.counters;
        ServerStats {
            total_connections: counters.total_connections.load(Ordering::Relaxed),
            active_connections: self.shared.registry.connection_count().await as u64,
            active_rooms: self.shared.registry.room_count().await,
            handshake_failures: counters.handshake_failures.load(Ordering::Relaxed),
            broadcasts: counters.broadcasts.load(Ordering::Relaxed),
        }
    }

    /// Bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    pub fn is_listening(&self) -> bool {
        self.accept_task.lock().is_some()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("bind_addr", &self.bind_addr)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

/// Upgrades run in a `JoinSet` owned by this loop, so aborting the loop
/// aborts every handshake still in flight.
async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    let mut upgrades = JoinSet::new();
    loop {
        while upgrades.try_join_next().is_some() {}

        match listener.accept().await {
            Ok((stream, peer)) => {
                log::debug!("New TCP connection from {peer}");
                upgrades.spawn(upgrade(stream, peer, Arc::clone(&shared)));
            }
            Err(e) => {
                shared.observers.notify_error(&ServerError::Accept(e));
                // Back off on resource exhaustion
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

async fn upgrade(stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) {
    if let Err(e) = stream.set_nodelay(true) {
        log::trace!("set_nodelay on {peer} failed: {e}");
    }

    let conn = match Connection::accept_in(stream, shared.config.clone(), Some(Arc::clone(&shared.registry))).await {
        Ok(conn) => conn,
        Err(source) => {
            shared.counters.handshake_failures.fetch_add(1, Ordering::Relaxed);
            shared.observers.notify_error(&ServerError::Connection {
                peer: peer.to_string(),
                source,
            });
            return;
        }
    };

    if let Some(store) = &shared.persistence {
        conn.persist(Arc::clone(store));
    }
    shared.registry.add_connection(&conn).await;
    // Either stop() sees the registration or we see the flag
    if shared.stopped.load(Ordering::SeqCst) {
        log::debug!("Server stopped during handshake with {peer}; closing");
        if let Err(e) = conn.close().await {
            log::trace!("Close of {} failed: {e}", conn.id());
        }
        return;
    }
    shared.counters.total_connections.fetch_add(1, Ordering::Relaxed);
    log::info!("Accepted connection {} from {peer}", conn.id());

    shared.observers.notify_connection(&conn);
    conn.start();
}
