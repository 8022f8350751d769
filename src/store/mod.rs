//! Persistence collaborators consumed by the real-time layer.
//!
//! The WebSocket core only ever talks to these traits; the Redis repositories
//! and the in-memory backend are interchangeable behind them.

pub mod memory;

pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{
    ChatLog, InventoryItem, Metadata, NewObject, ObjectId, ObjectType, Room, RoomId, RoomObject, RoomUser,
    ToolAction, ToolsLog, User, UserId,
};

/// Upper bound on page sizes for log reads
pub const MAX_PAGE_SIZE: usize = 100;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user. Usernames are unique.
    async fn create_user(&self, username: &str, avatar_url: Option<&str>) -> Result<User>;

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Ordered by id
    async fn list_users(&self, skip: usize, limit: usize) -> Result<Vec<User>>;

    /// Change username and/or avatar. `None` when the user does not exist;
    /// Conflict when the new username is taken.
    async fn update_user(
        &self,
        user_id: UserId,
        username: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<Option<User>>;

    /// Frees the username. Returns false when there was no such user.
    async fn delete_user(&self, user_id: UserId) -> Result<bool>;
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn create_room(&self, name: &str, owner_id: UserId, is_private: bool) -> Result<Room>;

    async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>>;

    async fn list_rooms(&self, skip: usize, limit: usize, public_only: bool) -> Result<Vec<Room>>;

    async fn room_exists(&self, room_id: RoomId) -> Result<bool> {
        Ok(self.get_room(room_id).await?.is_some())
    }

    /// Record the user as present in `room_id` at (x, y).
    /// Replaces any presence record the user holds in another room.
    async fn join_room(&self, user_id: UserId, room_id: RoomId, x: i32, y: i32) -> Result<RoomUser>;

    /// Remove the presence record. Returns false when there was none.
    async fn leave_room(&self, user_id: UserId, room_id: RoomId) -> Result<bool>;

    /// Move the user. `None` when the user has no presence record in that room.
    async fn update_position(
        &self,
        user_id: UserId,
        room_id: RoomId,
        x: i32,
        y: i32,
    ) -> Result<Option<RoomUser>>;

    async fn room_users(&self, room_id: RoomId) -> Result<Vec<RoomUser>>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Durably append a chat message; the stored record carries the server timestamp.
    async fn append_message(&self, room_id: RoomId, user_id: UserId, message: &str) -> Result<ChatLog>;

    /// Newest first
    async fn room_messages(&self, room_id: RoomId, skip: usize, limit: usize) -> Result<Vec<ChatLog>>;
}

#[async_trait]
pub trait ToolsStore: Send + Sync {
    async fn record_usage(
        &self,
        user_id: UserId,
        room_id: RoomId,
        target_object_id: ObjectId,
        action: ToolAction,
    ) -> Result<ToolsLog>;

    /// Newest first
    async fn room_logs(&self, room_id: RoomId, skip: usize, limit: usize) -> Result<Vec<ToolsLog>>;

    /// Newest first
    async fn user_logs(&self, user_id: UserId, skip: usize, limit: usize) -> Result<Vec<ToolsLog>>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn create_object(&self, object: NewObject) -> Result<RoomObject>;

    async fn get_object(&self, object_id: ObjectId) -> Result<Option<RoomObject>>;

    /// Ordered by id, optionally restricted to one type
    async fn list_objects(
        &self,
        skip: usize,
        limit: usize,
        object_type: Option<ObjectType>,
    ) -> Result<Vec<RoomObject>>;

    async fn room_objects(&self, room_id: RoomId, skip: usize, limit: usize) -> Result<Vec<RoomObject>>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn list_items(&self, user_id: UserId) -> Result<Vec<InventoryItem>>;

    async fn add_item(
        &self,
        user_id: UserId,
        object_type: ObjectType,
        quantity: u32,
        metadata: Option<Metadata>,
    ) -> Result<InventoryItem>;

    /// Take one unit of the user's item: decrement it, or remove it at quantity 1.
    /// Returns the item as it was before, `None` if the user holds no such item.
    async fn take_item(&self, user_id: UserId, item_id: i64) -> Result<Option<InventoryItem>>;
}

/// Tool actions may only target an object placed in the room they are used in
pub async fn ensure_object_in_room(
    objects: &dyn ObjectStore,
    room_id: RoomId,
    object_id: ObjectId,
) -> Result<RoomObject> {
    objects
        .get_object(object_id)
        .await?
        .filter(|object| object.room_id == room_id)
        .ok_or_else(|| AppError::NotFound(format!("object {} not in room {}", object_id, room_id)))
}

/// The full set of stores, shared by the HTTP and WebSocket layers
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub rooms: Arc<dyn RoomStore>,
    pub chat: Arc<dyn ChatStore>,
    pub tools: Arc<dyn ToolsStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub inventory: Arc<dyn InventoryStore>,
}

impl Stores {
    /// Every store backed by the same in-memory instance
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            users: store.clone(),
            rooms: store.clone(),
            chat: store.clone(),
            tools: store.clone(),
            objects: store.clone(),
            inventory: store,
        }
    }
}

/// Clamp user-supplied paging to sane bounds
pub fn page_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}
