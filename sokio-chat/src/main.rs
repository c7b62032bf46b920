//! Sokio Chat
//!
//! Demo chat server: clients join rooms with `join-room`, and every `chat`
//! event is relayed to the rooms its sender is in.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};

use sokio_core::Event;
use sokio_net::{Connection, Server, ServerConfig, ServerError};

/// Sokio demo chat server
#[derive(Parser, Debug)]
#[command(name = "sokio-chat")]
#[command(about = "WebSocket chat server with rooms", long_about = None)]
struct Args {
    /// Server host address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Directory for uploaded files (not stored if omitted)
    #[arg(long)]
    store: Option<PathBuf>,
}

/// Relay a `chat` event to every room the sender has joined.
fn relay_chat(conn: &Arc<Connection>) {
    let weak = Arc::downgrade(conn);
    conn.on("chat", move |event: &Event| {
        let Some(conn) = weak.upgrade() else {
            return;
        };
        let rooms = conn.rooms();
        if rooms.is_empty() {
            warn!("{} sent chat outside any room", conn.id());
            return;
        }

        let event = event.clone();
        tokio::spawn(async move {
            for room in rooms {
                if let Err(e) = conn.to_room(room.as_str()).emit_event(event.clone()).await {
                    warn!("Relay to room {room} failed: {e}");
                }
            }
        });
    });
}

/// Tell a client the id other clients can address it by.
fn answer_whoami(conn: &Arc<Connection>) {
    let weak = Arc::downgrade(conn);
    conn.on("whoami", move |_: &Event| {
        let Some(conn) = weak.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let id = conn.id().to_string();
            if let Err(e) = conn.emit("whoami", id).await {
                warn!("whoami reply failed: {e}");
            }
        });
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!("Starting Sokio Chat v{}", env!("CARGO_PKG_VERSION"));

    let bind_addr = format!("{}:{}", args.host, args.port);
    let config = match args.store {
        Some(path) => {
            std::fs::create_dir_all(&path)?;
            ServerConfig::with_storage(bind_addr, path)
        }
        None => ServerConfig {
            bind_addr,
            ..ServerConfig::default()
        },
    };

    let server = Server::new(config)?;
    server.on_connection(|conn: &Arc<Connection>| {
        let id = conn.id().to_string();
        conn.on_close(move || info!("{id} disconnected"));
        let id = conn.id().to_string();
        conn.on_error(move |e| error!("{id}: {e}"));
        let id = conn.id().to_string();
        conn.on_room_join(move |room: &str| info!("{id} joined {room}"));
        let id = conn.id().to_string();
        conn.on_room_leave(move |room: &str| info!("{id} left {room}"));

        relay_chat(conn);
        answer_whoami(conn);
        info!("{} connected", conn.id());
    });
    server.on_error(|e: &ServerError| error!("{e}"));

    let addr = server.listen().await?;
    info!("Chat server ready at ws://{addr}");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    server.stop().await;

    let stats = server.stats().await;
    info!(
        "Served {} connections ({} failed handshakes, {} broadcasts)",
        stats.total_connections, stats.handshake_failures, stats.broadcasts
    );
    Ok(())
}
