use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use socketioxide::extract::SocketRef;
use std::sync::Arc;

pub type ConnId = String;
pub type UserId = i64;
pub type RoomId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportRole {
    Send,
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
}

/// A connection's owned media resources: transports keyed by id, one
/// producer per kind, and consumers keyed by the producer they observe.
/// Guarded by its own mutex so mutating one connection's resources never
/// takes a registry-wide lock.
#[derive(Debug, Default)]
pub struct OwnedResources {
    pub transports: std::collections::HashMap<String, TransportRole>,
    pub producers: std::collections::HashMap<MediaKind, String>,
    pub consumers: std::collections::HashMap<String, String>,
}

pub struct ConnectionEntry {
    pub conn_id: ConnId,
    pub user_id: UserId,
    pub socket: SocketRef,
    pub room_id: Mutex<Option<RoomId>>,
    pub is_speaker: std::sync::atomic::AtomicBool,
    pub resources: Mutex<OwnedResources>,
}

impl ConnectionEntry {
    pub fn room(&self) -> Option<RoomId> {
        self.room_id.lock().clone()
    }
}

/// Process-local, concurrent-safe index of live connections: by
/// connection-id, by user-id (fan-out to all of a user's sockets), and by
/// room-id (room membership enumeration). No caller mutates the indices
/// directly — every mutation goes through a `ClientRegistry` method so the
/// three indices never drift out of sync with each other.
#[derive(Default)]
pub struct ClientRegistry {
    by_conn: DashMap<ConnId, Arc<ConnectionEntry>>,
    by_user: DashMap<UserId, DashSet<ConnId>>,
    by_room: DashMap<RoomId, DashSet<ConnId>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: registering a connection-id that already exists
    /// overwrites it (and removes the prior entry's dangling index
    /// rows first, which only matters if a socket id is ever reused).
    pub fn register(&self, entry: Arc<ConnectionEntry>) {
        let conn_id = entry.conn_id.clone();
        let user_id = entry.user_id;
        self.by_conn.insert(conn_id.clone(), entry);
        self.by_user.entry(user_id).or_default().insert(conn_id);
    }

    pub fn unregister(&self, conn_id: &str) -> Option<Arc<ConnectionEntry>> {
        let (_, entry) = self.by_conn.remove(conn_id)?;
        if let Some(users) = self.by_user.get(&entry.user_id) {
            users.remove(conn_id);
        }
        if let Some(room_id) = entry.room() {
            if let Some(room) = self.by_room.get(&room_id) {
                room.remove(conn_id);
            }
        }
        Some(entry)
    }

    pub fn get_by_conn_id(&self, conn_id: &str) -> Option<Arc<ConnectionEntry>> {
        self.by_conn.get(conn_id).map(|e| e.clone())
    }

    pub fn get_by_user_id(&self, user_id: UserId) -> Vec<Arc<ConnectionEntry>> {
        let Some(conn_ids) = self.by_user.get(&user_id) else {
            return Vec::new();
        };
        conn_ids
            .iter()
            .filter_map(|id| self.by_conn.get(id.key()).map(|e| e.clone()))
            .collect()
    }

    /// Enumerates room occupants, pruning any entry whose underlying
    /// socket has disconnected but whose index row survived — this keeps
    /// `room:join` snapshots from listing ghost participants.
    pub fn get_by_room_id(&self, room_id: &str) -> Vec<Arc<ConnectionEntry>> {
        let Some(conn_ids) = self.by_room.get(room_id) else {
            return Vec::new();
        };
        let mut live = Vec::new();
        let mut stale = Vec::new();
        for id in conn_ids.iter() {
            match self.by_conn.get(id.key()) {
                Some(entry) if entry.socket.connected() => live.push(entry.clone()),
                _ => stale.push(id.key().clone()),
            }
        }
        drop(conn_ids);
        if !stale.is_empty() {
            if let Some(room) = self.by_room.get(room_id) {
                for id in &stale {
                    room.remove(id);
                }
            }
        }
        live
    }

    /// Updates the room index for a connection. An empty string clears the
    /// room association, matching the documented sentinel.
    pub fn set_room(&self, conn_id: &str, room_id: &str) {
        let Some(entry) = self.by_conn.get(conn_id) else {
            return;
        };
        let prior = entry.room_id.lock().clone();
        if let Some(prior_room) = &prior {
            if let Some(set) = self.by_room.get(prior_room) {
                set.remove(conn_id);
            }
        }
        if room_id.is_empty() {
            *entry.room_id.lock() = None;
        } else {
            *entry.room_id.lock() = Some(room_id.to_string());
            self.by_room
                .entry(room_id.to_string())
                .or_default()
                .insert(conn_id.to_string());
        }
    }

    pub fn add_transport(&self, conn_id: &str, transport_id: String, role: TransportRole) {
        if let Some(entry) = self.by_conn.get(conn_id) {
            entry.resources.lock().transports.insert(transport_id, role);
        }
    }

    pub fn remove_transport(&self, conn_id: &str, transport_id: &str) -> Option<TransportRole> {
        self.by_conn
            .get(conn_id)
            .and_then(|e| e.resources.lock().transports.remove(transport_id))
    }

    pub fn add_producer(&self, conn_id: &str, kind: MediaKind, producer_id: String) {
        if let Some(entry) = self.by_conn.get(conn_id) {
            entry.resources.lock().producers.insert(kind, producer_id);
        }
    }

    pub fn remove_producer(&self, conn_id: &str, kind: MediaKind) -> Option<String> {
        self.by_conn
            .get(conn_id)
            .and_then(|e| e.resources.lock().producers.remove(&kind))
    }

    pub fn add_consumer(&self, conn_id: &str, producer_id: String, consumer_id: String) {
        if let Some(entry) = self.by_conn.get(conn_id) {
            entry.resources.lock().consumers.insert(producer_id, consumer_id);
        }
    }

    pub fn remove_consumer(&self, conn_id: &str, producer_id: &str) -> Option<String> {
        self.by_conn
            .get(conn_id)
            .and_then(|e| e.resources.lock().consumers.remove(producer_id))
    }

    /// Snapshot of a connection's owned resources, taken under its own
    /// lock, for the disconnect cleanup path (consumers, then producers,
    /// then transports, in that order per §4.1).
    pub fn take_resources(&self, conn_id: &str) -> OwnedResources {
        match self.by_conn.get(conn_id) {
            Some(entry) => std::mem::take(&mut *entry.resources.lock()),
            None => OwnedResources::default(),
        }
    }
}
