use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::models::{RoomId, User, UserId};

/// Serialized frame queued for a connection's writer task
pub type OutboundFrame = Arc<str>;

/// Why a frame could not be handed to a connection
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection closed")]
    Closed,
}

/// Client connection handle for sending messages.
/// Cheap to clone; every clone refers to the same live connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub conn_id: Uuid,
    pub user: Arc<User>,
    sender: mpsc::Sender<OutboundFrame>,
    close_signal: Arc<Notify>,
}

impl ConnectionHandle {
    pub fn new(conn_id: Uuid, user: User, sender: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            conn_id,
            user: Arc::new(user),
            sender,
            close_signal: Arc::new(Notify::new()),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    /// Queue a frame, waiting at most `timeout` for room in the outbound buffer
    pub async fn deliver(&self, frame: OutboundFrame, timeout: Duration) -> Result<(), DeliveryError> {
        self.sender.send_timeout(frame, timeout).await.map_err(|e| match e {
            mpsc::error::SendTimeoutError::Timeout(_) => DeliveryError::Timeout(timeout),
            mpsc::error::SendTimeoutError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Ask the owning supervisor to tear this connection down
    pub fn close(&self) {
        self.close_signal.notify_one();
    }

    /// Resolves once [`close`](Self::close) has been called
    pub async fn closed(&self) {
        self.close_signal.notified().await;
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("conn_id", &self.conn_id)
            .field("user_id", &self.user.id)
            .finish()
    }
}

/// What was known about a connection when it was unregistered
#[derive(Debug)]
pub struct Departure {
    pub handle: ConnectionHandle,
    /// Room the connection was in, or was evicted from
    pub room_id: Option<RoomId>,
}

struct SessionEntry {
    handle: ConnectionHandle,
    seq: u64,
    room_id: Option<RoomId>,
    evicted_from: Option<RoomId>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<Uuid, SessionEntry>,      // conn_id -> session
    rooms: HashMap<RoomId, HashSet<Uuid>>,      // room_id -> conn_ids
}

impl RegistryInner {
    fn detach(&mut self, conn_id: &Uuid) -> Option<RoomId> {
        let entry = self.sessions.get_mut(conn_id)?;
        let room_id = entry.room_id.take()?;

        if let Some(members) = self.rooms.get_mut(&room_id) {
            members.remove(conn_id);
            if members.is_empty() {
                self.rooms.remove(&room_id);
            }
        }

        Some(room_id)
    }
}

/// Live sessions and their room membership.
///
/// One lock guards both maps so that a room switch is never observed half-done:
/// readers see a connection in exactly its old room or exactly its new one.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
    next_seq: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an authenticated connection. Called once per connection.
    pub fn register(&self, handle: ConnectionHandle) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let conn_id = handle.conn_id;

        self.inner.write().sessions.insert(
            conn_id,
            SessionEntry {
                handle,
                seq,
                room_id: None,
                evicted_from: None,
            },
        );

        tracing::debug!(conn_id = %conn_id, "Session registered");
    }

    /// Remove the session and any room membership. Idempotent.
    pub fn unregister(&self, conn_id: &Uuid) -> Option<Departure> {
        let mut inner = self.inner.write();
        let room_id = inner.detach(conn_id);
        let entry = inner.sessions.remove(conn_id)?;

        tracing::debug!(conn_id = %conn_id, "Session unregistered");
        Some(Departure {
            handle: entry.handle,
            room_id: room_id.or(entry.evicted_from),
        })
    }

    /// Move the connection into `room_id`, leaving its previous room atomically.
    /// Returns the room it left, if it was in a different one.
    pub fn join_room(&self, conn_id: &Uuid, room_id: RoomId) -> Option<RoomId> {
        let mut inner = self.inner.write();
        if !inner.sessions.contains_key(conn_id) {
            return None;
        }

        let previous = inner.detach(conn_id).filter(|old| *old != room_id);

        inner.rooms.entry(room_id).or_default().insert(*conn_id);
        if let Some(entry) = inner.sessions.get_mut(conn_id) {
            entry.room_id = Some(room_id);
            entry.evicted_from = None;
        }

        previous
    }

    /// Leave whatever room the connection is in; `None` if it was in none
    pub fn leave_room(&self, conn_id: &Uuid) -> Option<RoomId> {
        self.inner.write().detach(conn_id)
    }

    /// Drop the connection's membership right away and ask its supervisor to close.
    /// The session itself stays until the supervisor unregisters it.
    pub fn evict(&self, conn_id: &Uuid) {
        let handle = {
            let mut inner = self.inner.write();
            let room_id = inner.detach(conn_id);
            match inner.sessions.get_mut(conn_id) {
                Some(entry) => {
                    if room_id.is_some() {
                        entry.evicted_from = room_id;
                    }
                    entry.handle.clone()
                }
                None => return,
            }
        };

        tracing::warn!(conn_id = %conn_id, user_id = %handle.user_id(), "Evicting unresponsive connection");
        handle.close();
    }

    /// Snapshot of the connections currently in `room_id`
    pub fn members_of(&self, room_id: RoomId) -> Vec<ConnectionHandle> {
        let inner = self.inner.read();
        inner
            .rooms
            .get(&room_id)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| inner.sessions.get(id))
                    .map(|entry| entry.handle.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The user's connection within `room_id`; the most recently registered one
    /// when the user has several there
    pub fn find_by_user_in_room(&self, room_id: RoomId, user_id: UserId) -> Option<ConnectionHandle> {
        let inner = self.inner.read();
        inner
            .rooms
            .get(&room_id)?
            .iter()
            .filter_map(|id| inner.sessions.get(id))
            .filter(|entry| entry.handle.user_id() == user_id)
            .max_by_key(|entry| entry.seq)
            .map(|entry| entry.handle.clone())
    }

    pub fn room_of(&self, conn_id: &Uuid) -> Option<RoomId> {
        self.inner.read().sessions.get(conn_id)?.room_id
    }

    pub fn is_registered(&self, conn_id: &Uuid) -> bool {
        self.inner.read().sessions.contains_key(conn_id)
    }

    pub fn session_count(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn room_count(&self) -> usize {
        self.inner.read().rooms.len()
    }

    pub fn member_count(&self, room_id: RoomId) -> usize {
        self.inner.read().rooms.get(&room_id).map_or(0, HashSet::len)
    }
}
