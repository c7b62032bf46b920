//! Room membership and room-routed events over real connections.

use std::sync::Arc;

use sokio_net::{Client, Connection, ConnectionConfig, Event, Server, ServerConfig};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};

const WAIT: Duration = Duration::from_secs(3);

struct Harness {
    server: Server,
    url: String,
    accepted: mpsc::UnboundedReceiver<Arc<Connection>>,
}

async fn start_test_server() -> Harness {
    let server = Server::new(ServerConfig {
        bind_addr: "127.0.0.1:0".into(),
        ..ServerConfig::default()
    })
    .unwrap();

    let (tx, accepted) = mpsc::unbounded_channel();
    server.on_connection(move |conn: &Arc<Connection>| {
        let _ = tx.send(Arc::clone(conn));
    });

    let addr = server.listen().await.unwrap();
    Harness {
        server,
        url: format!("ws://{addr}"),
        accepted,
    }
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting")
        .expect("channel closed")
}

fn record(conn: &Connection, name: &str) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    conn.on(name, move |ev: &Event| {
        let _ = tx.send(ev.clone());
    });
    rx
}

/// A started client plus its server-side connection, with that side's
/// room joins and leaves reported as `(joined, room)`.
struct Peer {
    client: Arc<Connection>,
    server_side: Arc<Connection>,
    membership: mpsc::UnboundedReceiver<(bool, String)>,
}

async fn join_peer(harness: &mut Harness) -> Peer {
    let client = Client::open(&harness.url, ConnectionConfig::default())
        .await
        .unwrap();
    let server_side = timeout(WAIT, harness.accepted.recv()).await.unwrap().unwrap();

    let (tx, membership) = mpsc::unbounded_channel();
    let joins = tx.clone();
    server_side.on_room_join(move |room: &str| {
        let _ = joins.send((true, room.to_string()));
    });
    server_side.on_room_leave(move |room: &str| {
        let _ = tx.send((false, room.to_string()));
    });

    Peer {
        client,
        server_side,
        membership,
    }
}

impl Peer {
    async fn join(&mut self, room: &str) {
        self.client.join_room(room).await.unwrap();
        assert_eq!(recv(&mut self.membership).await, (true, room.to_string()));
    }

    async fn leave(&mut self, room: &str) {
        self.client.leave_room(room).await.unwrap();
        assert_eq!(recv(&mut self.membership).await, (false, room.to_string()));
    }
}

#[tokio::test]
async fn test_join_over_the_wire_updates_registry() {
    let mut harness = start_test_server().await;
    let mut alice = join_peer(&mut harness).await;
    alice.client.start();

    alice.join("lobby").await;

    let registry = harness.server.registry();
    let room = registry.room("lobby").await.unwrap();
    assert!(room.contains(alice.server_side.id()));
    assert_eq!(room.key(), "room-lobby");
    assert_eq!(alice.server_side.rooms(), vec!["lobby".to_string()]);
    assert_eq!(alice.client.rooms(), vec!["lobby".to_string()]);
    assert_eq!(harness.server.stats().await.active_rooms, 1);

    alice.leave("lobby").await;
    assert!(registry.room("lobby").await.is_none());
    assert!(alice.client.rooms().is_empty());
}

#[tokio::test]
async fn test_room_event_excludes_sender() {
    let mut harness = start_test_server().await;
    let mut alice = join_peer(&mut harness).await;
    let mut bob = join_peer(&mut harness).await;
    let carol = join_peer(&mut harness).await;

    let mut alice_inbox = record(&alice.client, "chat");
    let mut bob_inbox = record(&bob.client, "chat");
    let mut carol_inbox = record(&carol.client, "chat");
    for peer in [&alice, &bob, &carol] {
        peer.client.start();
    }

    alice.join("lobby").await;
    bob.join("lobby").await;

    alice.client.to_room("lobby").emit("chat", "hi lobby").await.unwrap();

    let ev = recv(&mut bob_inbox).await;
    assert_eq!(ev.message().content(), Some("hi lobby"));
    assert_eq!(ev.message().room_id.as_deref(), Some("lobby"));
    assert_eq!(ev.message().sender_id.as_deref(), Some(alice.client.id()));

    sleep(Duration::from_millis(100)).await;
    assert!(alice_inbox.try_recv().is_err());
    assert!(carol_inbox.try_recv().is_err());
}

#[tokio::test]
async fn test_left_member_stops_receiving() {
    let mut harness = start_test_server().await;
    let mut alice = join_peer(&mut harness).await;
    let mut bob = join_peer(&mut harness).await;
    let mut carol = join_peer(&mut harness).await;

    let mut bob_inbox = record(&bob.client, "chat");
    let mut carol_inbox = record(&carol.client, "chat");
    for peer in [&alice, &bob, &carol] {
        peer.client.start();
    }

    alice.join("lobby").await;
    bob.join("lobby").await;
    carol.join("lobby").await;
    bob.leave("lobby").await;

    alice.client.to_room("lobby").emit("chat", "who's left?").await.unwrap();

    assert_eq!(recv(&mut carol_inbox).await.message().content(), Some("who's left?"));
    sleep(Duration::from_millis(100)).await;
    assert!(bob_inbox.try_recv().is_err());
    assert_eq!(harness.server.registry().members_of("lobby").await.len(), 2);
}

#[tokio::test]
async fn test_disconnect_empties_rooms() {
    let mut harness = start_test_server().await;
    let mut alice = join_peer(&mut harness).await;
    alice.client.start();
    alice.join("solo").await;
    alice.join("duo").await;

    let (tx, mut closed) = mpsc::unbounded_channel();
    alice.server_side.on_close(move || {
        let _ = tx.send(());
    });
    alice.client.close().await.unwrap();
    recv(&mut closed).await;

    let registry = harness.server.registry();
    assert_eq!(registry.room_count().await, 0);
    assert!(alice.server_side.rooms().is_empty());
}

#[tokio::test]
async fn test_server_side_emit_to_room() {
    let mut harness = start_test_server().await;
    let mut alice = join_peer(&mut harness).await;
    let mut bob = join_peer(&mut harness).await;

    let mut alice_inbox = record(&alice.client, "notice");
    let mut bob_inbox = record(&bob.client, "notice");
    alice.client.start();
    bob.client.start();

    alice.join("ops").await;
    bob.join("ops").await;

    // Server-side emit from alice's connection reaches the other members
    alice
        .server_side
        .to_room("ops")
        .emit("notice", "maintenance at noon")
        .await
        .unwrap();

    assert_eq!(
        recv(&mut bob_inbox).await.message().content(),
        Some("maintenance at noon")
    );
    sleep(Duration::from_millis(100)).await;
    assert!(alice_inbox.try_recv().is_err());
}

#[tokio::test]
async fn test_join_room_without_id_is_ignored() {
    let mut harness = start_test_server().await;
    let alice = join_peer(&mut harness).await;
    let mut after = record(&alice.server_side, "after");
    alice.client.start();

    alice.client.emit("join-room", "").await.unwrap();
    alice.client.emit("after", "done").await.unwrap();

    recv(&mut after).await;
    assert_eq!(harness.server.registry().room_count().await, 0);
    assert!(alice.server_side.rooms().is_empty());
}

#[tokio::test]
async fn test_receiver_takes_precedence_over_room() {
    let mut harness = start_test_server().await;
    let mut alice = join_peer(&mut harness).await;
    let mut bob = join_peer(&mut harness).await;
    let mut carol = join_peer(&mut harness).await;

    let mut bob_inbox = record(&bob.client, "chat");
    let mut carol_inbox = record(&carol.client, "chat");
    for peer in [&alice, &bob, &carol] {
        peer.client.start();
    }

    alice.join("lobby").await;
    bob.join("lobby").await;
    carol.join("lobby").await;

    let message = sokio_net::Message::text("just for bob")
        .with_room("lobby")
        .with_receiver(bob.server_side.id());
    let event = sokio_net::factory::event("chat", message).unwrap();
    alice.client.emitter().emit_event(event).await.unwrap();

    let ev = recv(&mut bob_inbox).await;
    assert_eq!(ev.message().content(), Some("just for bob"));
    assert_eq!(ev.message().receiver_id, None);
    sleep(Duration::from_millis(100)).await;
    assert!(carol_inbox.try_recv().is_err());
    assert!(bob_inbox.try_recv().is_err());
}
