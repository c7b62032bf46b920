//! Process-wide directory of live connections and rooms.
//!
//! Connections are held weakly: the receive task owns each connection, and
//! teardown removes it from here. Rooms exist only while they have members.
//! Membership changes and room snapshots share one lock.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;

use crate::connection::Connection;

/// Prefix applied to caller-supplied room ids.
pub const ROOM_PREFIX: &str = "room-";

/// Internal key for a room id.
pub fn room_key(room_id: &str) -> String {
    format!("{ROOM_PREFIX}{room_id}")
}

/// A named group of connection ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    id: String,
    members: HashSet<String>,
}

impl Room {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            members: HashSet::new(),
        }
    }

    /// Caller-supplied id, without the prefix.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> String {
        room_key(&self.id)
    }

    pub fn contains(&self, conn_id: &str) -> bool {
        self.members.contains(conn_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }
}

#[derive(Default)]
struct Directory {
    connections: HashMap<String, Weak<Connection>>,
    rooms: HashMap<String, Room>,
}

/// Live connections and rooms behind one async lock.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Directory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_connection(&self, conn: &Arc<Connection>) {
        let mut dir = self.inner.write().await;
        dir.connections
            .insert(conn.id().to_string(), Arc::downgrade(conn));
        log::debug!("Registered connection {}", conn.id());
    }

    /// Drop a connection and its memberships. Returns the rooms it was in.
    pub async fn remove_connection(&self, conn_id: &str) -> Vec<String> {
        let mut dir = self.inner.write().await;
        dir.connections.remove(conn_id);

        let mut left = Vec::new();
        dir.rooms.retain(|_, room| {
            if room.members.remove(conn_id) {
                left.push(room.id.clone());
            }
            if room.members.is_empty() {
                log::debug!("Room {} removed (empty)", room.id);
                false
            } else {
                true
            }
        });
        left
    }

    /// Add `conn` to a room, creating it on first join. Returns `false` if it
    /// was already a member.
    pub async fn join(&self, room_id: &str, conn: &Connection) -> bool {
        let joined = {
            let mut dir = self.inner.write().await;
            dir.rooms
                .entry(room_key(room_id))
                .or_insert_with(|| Room::new(room_id))
                .members
                .insert(conn.id().to_string())
        };
        conn.record_room(room_id);
        if joined {
            log::debug!("Connection {} joined room {room_id}", conn.id());
        }
        joined
    }

    /// Remove `conn` from a room, deleting the room once empty. Returns
    /// `false` if it was not a member.
    pub async fn leave(&self, room_id: &str, conn: &Connection) -> bool {
        let left = {
            let mut dir = self.inner.write().await;
            let key = room_key(room_id);
            match dir.rooms.get_mut(&key) {
                Some(room) => {
                    let removed = room.members.remove(conn.id());
                    if room.members.is_empty() {
                        dir.rooms.remove(&key);
                        log::debug!("Room {room_id} removed (empty)");
                    }
                    removed
                }
                None => false,
            }
        };
        conn.forget_room(room_id);
        left
    }

    pub async fn lookup(&self, conn_id: &str) -> Option<Arc<Connection>> {
        self.inner
            .read()
            .await
            .connections
            .get(conn_id)
            .and_then(Weak::upgrade)
    }

    /// Snapshot of a room's live members; empty if the room does not exist.
    pub async fn members_of(&self, room_id: &str) -> Vec<Arc<Connection>> {
        let dir = self.inner.read().await;
        let Some(room) = dir.rooms.get(&room_key(room_id)) else {
            return Vec::new();
        };
        room.members
            .iter()
            .filter_map(|id| dir.connections.get(id))
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub async fn room(&self, room_id: &str) -> Option<Room> {
        self.inner.read().await.rooms.get(&room_key(room_id)).cloned()
    }

    /// Rooms a connection belongs to, sorted.
    pub async fn rooms_of(&self, conn_id: &str) -> Vec<String> {
        let dir = self.inner.read().await;
        let mut rooms: Vec<String> = dir
            .rooms
            .values()
            .filter(|room| room.contains(conn_id))
            .map(|room| room.id.clone())
            .collect();
        rooms.sort();
        rooms
    }

    /// Snapshot of every live connection.
    pub async fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner
            .read()
            .await
            .connections
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner
            .read()
            .await
            .connections
            .values()
            .filter(|conn| conn.strong_count() > 0)
            .count()
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}
