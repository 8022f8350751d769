use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{AppError, Result};
use crate::models::{
    ChatLog, InventoryItem, Metadata, NewObject, ObjectId, ObjectType, Room, RoomId, RoomObject, RoomUser,
    ToolAction, ToolsLog, User, UserId,
};
use crate::store::{ChatStore, InventoryStore, ObjectStore, RoomStore, ToolsStore, UserStore};

/// Process-local backend for every store trait.
/// Used with `STORAGE_BACKEND=memory` and throughout the tests.
#[derive(Default)]
pub struct MemoryStore {
    next_id: AtomicI64,
    users: DashMap<UserId, User>,
    usernames: DashMap<String, UserId>,
    rooms: DashMap<RoomId, Room>,
    presence: DashMap<UserId, RoomUser>, // one record per user
    chat: DashMap<RoomId, Vec<ChatLog>>,
    tools: DashMap<RoomId, Vec<ToolsLog>>,
    objects: DashMap<ObjectId, RoomObject>,
    inventory: DashMap<i64, InventoryItem>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn newest_first<T: Clone>(items: &[T], skip: usize, limit: usize) -> Vec<T> {
    items.iter().rev().skip(skip).take(limit).cloned().collect()
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, username: &str, avatar_url: Option<&str>) -> Result<User> {
        match self.usernames.entry(username.to_string()) {
            Entry::Occupied(_) => Err(AppError::Conflict("Username already registered".to_string())),
            Entry::Vacant(slot) => {
                let user = User {
                    id: self.next_id(),
                    username: username.to_string(),
                    avatar_url: avatar_url.map(str::to_string),
                    created_at: Utc::now(),
                };
                self.users.insert(user.id, user.clone());
                slot.insert(user.id);
                Ok(user)
            }
        }
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let id = match self.usernames.get(username) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get_user(id).await
    }

    async fn list_users(&self, skip: usize, limit: usize) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.clone()).collect();
        users.sort_by_key(|u| u.id);
        Ok(users.into_iter().skip(skip).take(limit).collect())
    }

    async fn update_user(
        &self,
        user_id: UserId,
        username: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<Option<User>> {
        let Some(mut user) = self.users.get(&user_id).map(|u| u.clone()) else {
            return Ok(None);
        };

        if let Some(new_name) = username.filter(|name| *name != user.username) {
            match self.usernames.entry(new_name.to_string()) {
                Entry::Occupied(_) => {
                    return Err(AppError::Conflict("Username already registered".to_string()))
                }
                Entry::Vacant(slot) => {
                    slot.insert(user_id);
                }
            }
            self.usernames.remove(&user.username);
            user.username = new_name.to_string();
        }
        if let Some(url) = avatar_url {
            user.avatar_url = Some(url.to_string());
        }

        self.users.insert(user_id, user.clone());
        Ok(Some(user))
    }

    async fn delete_user(&self, user_id: UserId) -> Result<bool> {
        let Some((_, user)) = self.users.remove(&user_id) else {
            return Ok(false);
        };

        self.usernames.remove(&user.username);
        self.presence.remove(&user_id);
        self.inventory.retain(|_, item| item.user_id != user_id);
        Ok(true)
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn create_room(&self, name: &str, owner_id: UserId, is_private: bool) -> Result<Room> {
        let room = Room {
            id: self.next_id(),
            name: name.to_string(),
            owner_id,
            is_private,
            created_at: Utc::now(),
        };
        self.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>> {
        Ok(self.rooms.get(&room_id).map(|r| r.clone()))
    }

    async fn list_rooms(&self, skip: usize, limit: usize, public_only: bool) -> Result<Vec<Room>> {
        let mut rooms: Vec<Room> = self
            .rooms
            .iter()
            .filter(|r| !public_only || !r.is_private)
            .map(|r| r.clone())
            .collect();
        rooms.sort_by_key(|r| r.id);
        Ok(rooms.into_iter().skip(skip).take(limit).collect())
    }

    async fn join_room(&self, user_id: UserId, room_id: RoomId, x: i32, y: i32) -> Result<RoomUser> {
        let record = RoomUser {
            room_id,
            user_id,
            x,
            y,
            last_seen: Utc::now(),
        };
        self.presence.insert(user_id, record.clone());
        Ok(record)
    }

    async fn leave_room(&self, user_id: UserId, room_id: RoomId) -> Result<bool> {
        Ok(self
            .presence
            .remove_if(&user_id, |_, r| r.room_id == room_id)
            .is_some())
    }

    async fn update_position(
        &self,
        user_id: UserId,
        room_id: RoomId,
        x: i32,
        y: i32,
    ) -> Result<Option<RoomUser>> {
        match self.presence.get_mut(&user_id) {
            Some(mut record) if record.room_id == room_id => {
                record.x = x;
                record.y = y;
                record.last_seen = Utc::now();
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn room_users(&self, room_id: RoomId) -> Result<Vec<RoomUser>> {
        let mut users: Vec<RoomUser> = self
            .presence
            .iter()
            .filter(|r| r.room_id == room_id)
            .map(|r| r.clone())
            .collect();
        users.sort_by_key(|r| r.user_id);
        Ok(users)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn append_message(&self, room_id: RoomId, user_id: UserId, message: &str) -> Result<ChatLog> {
        let log = ChatLog {
            id: self.next_id(),
            room_id,
            user_id,
            message: message.to_string(),
            created_at: Utc::now(),
        };
        self.chat.entry(room_id).or_default().push(log.clone());
        Ok(log)
    }

    async fn room_messages(&self, room_id: RoomId, skip: usize, limit: usize) -> Result<Vec<ChatLog>> {
        Ok(self
            .chat
            .get(&room_id)
            .map(|logs| newest_first(&logs, skip, limit))
            .unwrap_or_default())
    }
}

#[async_trait]
impl ToolsStore for MemoryStore {
    async fn record_usage(
        &self,
        user_id: UserId,
        room_id: RoomId,
        target_object_id: ObjectId,
        action: ToolAction,
    ) -> Result<ToolsLog> {
        let log = ToolsLog {
            id: self.next_id(),
            user_id,
            room_id,
            target_object_id,
            action,
            created_at: Utc::now(),
        };
        self.tools.entry(room_id).or_default().push(log.clone());
        Ok(log)
    }

    async fn room_logs(&self, room_id: RoomId, skip: usize, limit: usize) -> Result<Vec<ToolsLog>> {
        Ok(self
            .tools
            .get(&room_id)
            .map(|logs| newest_first(&logs, skip, limit))
            .unwrap_or_default())
    }

    async fn user_logs(&self, user_id: UserId, skip: usize, limit: usize) -> Result<Vec<ToolsLog>> {
        let mut logs: Vec<ToolsLog> = self
            .tools
            .iter()
            .flat_map(|room| {
                room.iter()
                    .filter(|log| log.user_id == user_id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        logs.sort_by_key(|log| log.id);
        Ok(newest_first(&logs, skip, limit))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create_object(&self, object: NewObject) -> Result<RoomObject> {
        let object = RoomObject {
            id: self.next_id(),
            room_id: object.room_id,
            object_type: object.object_type,
            x: object.x,
            y: object.y,
            rotation: object.rotation,
            metadata: object.metadata,
            created_at: Utc::now(),
        };
        self.objects.insert(object.id, object.clone());
        Ok(object)
    }

    async fn get_object(&self, object_id: ObjectId) -> Result<Option<RoomObject>> {
        Ok(self.objects.get(&object_id).map(|o| o.clone()))
    }

    async fn list_objects(
        &self,
        skip: usize,
        limit: usize,
        object_type: Option<ObjectType>,
    ) -> Result<Vec<RoomObject>> {
        let mut objects: Vec<RoomObject> = self
            .objects
            .iter()
            .filter(|o| object_type.map_or(true, |t| o.object_type == t))
            .map(|o| o.clone())
            .collect();
        objects.sort_by_key(|o| o.id);
        Ok(objects.into_iter().skip(skip).take(limit).collect())
    }

    async fn room_objects(&self, room_id: RoomId, skip: usize, limit: usize) -> Result<Vec<RoomObject>> {
        let mut objects: Vec<RoomObject> = self
            .objects
            .iter()
            .filter(|o| o.room_id == room_id)
            .map(|o| o.clone())
            .collect();
        objects.sort_by_key(|o| o.id);
        Ok(objects.into_iter().skip(skip).take(limit).collect())
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn list_items(&self, user_id: UserId) -> Result<Vec<InventoryItem>> {
        let mut items: Vec<InventoryItem> = self
            .inventory
            .iter()
            .filter(|i| i.user_id == user_id)
            .map(|i| i.clone())
            .collect();
        items.sort_by_key(|i| i.id);
        Ok(items)
    }

    async fn add_item(
        &self,
        user_id: UserId,
        object_type: ObjectType,
        quantity: u32,
        metadata: Option<Metadata>,
    ) -> Result<InventoryItem> {
        let item = InventoryItem {
            id: self.next_id(),
            user_id,
            object_type,
            quantity,
            metadata,
            created_at: Utc::now(),
        };
        self.inventory.insert(item.id, item.clone());
        Ok(item)
    }

    async fn take_item(&self, user_id: UserId, item_id: i64) -> Result<Option<InventoryItem>> {
        let Entry::Occupied(mut slot) = self.inventory.entry(item_id) else {
            return Ok(None);
        };
        if slot.get().user_id != user_id {
            return Ok(None);
        }

        let before = slot.get().clone();
        if before.quantity > 1 {
            slot.get_mut().quantity -= 1;
        } else {
            slot.remove();
        }
        Ok(Some(before))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_usernames_are_unique() {
        let store = MemoryStore::new();
        let alice = store.create_user("alice", None).await.unwrap();

        assert!(matches!(
            store.create_user("alice", Some("x.png")).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(store.get_user_by_username("alice").await.unwrap(), Some(alice));
        assert_eq!(store.get_user_by_username("bob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_join_replaces_previous_presence() {
        let store = MemoryStore::new();
        store.join_room(1, 10, 0, 0).await.unwrap();
        store.join_room(1, 20, 5, 5).await.unwrap();

        assert!(store.room_users(10).await.unwrap().is_empty());
        assert_eq!(store.room_users(20).await.unwrap().len(), 1);

        // Leaving a room the user is not in is a no-op
        assert!(!store.leave_room(1, 10).await.unwrap());
        assert!(store.leave_room(1, 20).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_position_requires_presence() {
        let store = MemoryStore::new();
        assert_eq!(store.update_position(1, 10, 3, 4).await.unwrap(), None);

        store.join_room(1, 10, 0, 0).await.unwrap();
        let moved = store.update_position(1, 10, 3, 4).await.unwrap().unwrap();
        assert_eq!((moved.x, moved.y), (3, 4));
        assert_eq!(store.update_position(1, 11, 3, 4).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_chat_log_is_newest_first() {
        let store = MemoryStore::new();
        for text in ["one", "two", "three"] {
            store.append_message(7, 1, text).await.unwrap();
        }

        let page: Vec<String> = store
            .room_messages(7, 1, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(page, vec!["two".to_string(), "one".to_string()]);
    }

    #[tokio::test]
    async fn test_rename_checks_uniqueness() {
        let store = MemoryStore::new();
        let alice = store.create_user("alice", None).await.unwrap();
        store.create_user("bob", None).await.unwrap();

        assert!(matches!(
            store.update_user(alice.id, Some("bob"), None).await,
            Err(AppError::Conflict(_))
        ));

        let renamed = store
            .update_user(alice.id, Some("alicia"), Some("a.png"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.username, "alicia");
        assert_eq!(renamed.avatar_url.as_deref(), Some("a.png"));
        assert_eq!(store.get_user_by_username("alice").await.unwrap(), None);
        assert_eq!(store.get_user_by_username("alicia").await.unwrap(), Some(renamed));

        // The old name is free again
        assert!(store.create_user("alice", None).await.is_ok());
        assert_eq!(store.update_user(999, Some("x"), None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_user_frees_username() {
        let store = MemoryStore::new();
        let alice = store.create_user("alice", None).await.unwrap();
        store.add_item(alice.id, ObjectType::Plant, 2, None).await.unwrap();

        assert!(store.delete_user(alice.id).await.unwrap());
        assert!(!store.delete_user(alice.id).await.unwrap());
        assert!(store.list_items(alice.id).await.unwrap().is_empty());
        assert!(store.create_user("alice", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_take_item_decrements_then_removes() {
        let store = MemoryStore::new();
        let item = store.add_item(1, ObjectType::Chair, 2, None).await.unwrap();

        // Someone else's item is invisible
        assert_eq!(store.take_item(2, item.id).await.unwrap(), None);

        assert_eq!(store.take_item(1, item.id).await.unwrap().unwrap().quantity, 2);
        assert_eq!(store.list_items(1).await.unwrap()[0].quantity, 1);
        assert_eq!(store.take_item(1, item.id).await.unwrap().unwrap().quantity, 1);
        assert!(store.list_items(1).await.unwrap().is_empty());
        assert_eq!(store.take_item(1, item.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_objects_filter_by_room_and_type() {
        let store = MemoryStore::new();
        let new = |room_id, object_type| NewObject {
            room_id,
            object_type,
            x: 0,
            y: 0,
            rotation: 0.0,
            metadata: None,
        };
        let chair = store.create_object(new(1, ObjectType::Chair)).await.unwrap();
        store.create_object(new(1, ObjectType::Plant)).await.unwrap();
        store.create_object(new(2, ObjectType::Chair)).await.unwrap();

        assert_eq!(store.room_objects(1, 0, 10).await.unwrap().len(), 2);
        assert_eq!(store.list_objects(0, 10, Some(ObjectType::Chair)).await.unwrap().len(), 2);
        assert_eq!(store.list_objects(0, 10, None).await.unwrap().len(), 3);

        assert!(crate::store::ensure_object_in_room(&store, 1, chair.id).await.is_ok());
        assert!(matches!(
            crate::store::ensure_object_in_room(&store, 2, chair.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_user_tool_logs() {
        let store = MemoryStore::new();
        store.record_usage(1, 10, 5, ToolAction::Move).await.unwrap();
        store.record_usage(2, 10, 5, ToolAction::Destroy).await.unwrap();
        store.record_usage(1, 11, 6, ToolAction::Destroy).await.unwrap();

        let logs = store.user_logs(1, 0, 10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].room_id, 11);
    }
}
