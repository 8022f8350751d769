use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::error::{AppError, Result};
use crate::models::{Room, RoomId, RoomUser, UserId};
use crate::redis::MAX_TX_ATTEMPTS;
use crate::store::RoomStore;

const NEXT_ROOM_ID: &str = "rooms:next_id";
const ROOM_INDEX: &str = "rooms";

fn room_key(room_id: RoomId) -> String {
    format!("room:{}", room_id)
}

fn room_users_key(room_id: RoomId) -> String {
    format!("room:{}:users", room_id)
}

fn presence_key(room_id: RoomId, user_id: UserId) -> String {
    format!("room:{}:user:{}", room_id, user_id)
}

fn current_room_key(user_id: UserId) -> String {
    format!("user:{}:room", user_id)
}

/// Room metadata and presence records in Redis.
/// Presence hashes expire after `presence_ttl_seconds` without updates.
#[derive(Clone)]
pub struct RoomRepository {
    pool: Pool,
    presence_ttl_seconds: u64,
}

impl RoomRepository {
    pub fn new(pool: Pool, presence_ttl_seconds: u64) -> Self {
        Self {
            pool,
            presence_ttl_seconds,
        }
    }

    async fn write_presence(&self, record: &RoomUser) -> Result<()> {
        let mut conn = self.pool.get().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        queue_presence(&mut pipe, record, self.presence_ttl_seconds);
        pipe.query_async::<()>(&mut *conn).await?;

        Ok(())
    }

    async fn read_presence(&self, room_id: RoomId, user_id: UserId) -> Result<Option<RoomUser>> {
        let mut conn = self.pool.get().await?;
        let fields: HashMap<String, String> = conn.hgetall(presence_key(room_id, user_id)).await?;

        Ok(parse_presence(room_id, user_id, &fields))
    }
}

/// Queue the commands that persist a presence record onto `pipe`
fn queue_presence(pipe: &mut redis::Pipeline, record: &RoomUser, ttl_seconds: u64) {
    let key = presence_key(record.room_id, record.user_id);

    pipe.hset_multiple(
        &key,
        &[
            ("x", record.x.to_string()),
            ("y", record.y.to_string()),
            ("last_seen", record.last_seen.to_rfc3339()),
        ],
    )
    .ignore()
    .expire(&key, ttl_seconds as i64)
    .ignore()
    .sadd(room_users_key(record.room_id), record.user_id)
    .ignore()
    .set_ex(current_room_key(record.user_id), record.room_id, ttl_seconds)
    .ignore();
}

fn parse_presence(room_id: RoomId, user_id: UserId, fields: &HashMap<String, String>) -> Option<RoomUser> {
    if fields.is_empty() {
        return None;
    }

    let coord = |name: &str| fields.get(name).and_then(|v| v.parse().ok()).unwrap_or(0);
    let last_seen = fields
        .get("last_seen")
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(RoomUser {
        room_id,
        user_id,
        x: coord("x"),
        y: coord("y"),
        last_seen,
    })
}

#[async_trait]
impl RoomStore for RoomRepository {
    async fn create_room(&self, name: &str, owner_id: UserId, is_private: bool) -> Result<Room> {
        let mut conn = self.pool.get().await?;

        let id: i64 = conn.incr(NEXT_ROOM_ID, 1).await?;
        let room = Room {
            id,
            name: name.to_string(),
            owner_id,
            is_private,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&room)?;

        redis::pipe()
            .atomic()
            .set(room_key(id), json)
            .ignore()
            .sadd(ROOM_INDEX, id)
            .ignore()
            .query_async::<()>(&mut *conn)
            .await?;

        tracing::info!(room_id = %id, name = %name, "Room created");
        Ok(room)
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>> {
        let mut conn = self.pool.get().await?;

        let json: Option<String> = conn.get(room_key(room_id)).await?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn room_exists(&self, room_id: RoomId) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let exists: bool = conn.exists(room_key(room_id)).await?;
        Ok(exists)
    }

    async fn list_rooms(&self, skip: usize, limit: usize, public_only: bool) -> Result<Vec<Room>> {
        let mut ids: Vec<i64> = {
            let mut conn = self.pool.get().await?;
            conn.smembers(ROOM_INDEX).await?
        };
        ids.sort_unstable();

        let mut rooms = Vec::new();
        for id in ids {
            if let Some(room) = self.get_room(id).await? {
                if !public_only || !room.is_private {
                    rooms.push(room);
                }
            }
        }

        Ok(rooms.into_iter().skip(skip).take(limit).collect())
    }

    async fn join_room(&self, user_id: UserId, room_id: RoomId, x: i32, y: i32) -> Result<RoomUser> {
        let previous: Option<i64> = {
            let mut conn = self.pool.get().await?;
            conn.get(current_room_key(user_id)).await?
        };

        if let Some(old_room) = previous.filter(|old| *old != room_id) {
            self.leave_room(user_id, old_room).await?;
        }

        let record = RoomUser {
            room_id,
            user_id,
            x,
            y,
            last_seen: Utc::now(),
        };
        self.write_presence(&record).await?;

        tracing::debug!(room_id = %room_id, user_id = %user_id, "Presence recorded");
        Ok(record)
    }

    async fn leave_room(&self, user_id: UserId, room_id: RoomId) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let removed: i64 = conn.srem(room_users_key(room_id), user_id).await?;
        let current: Option<i64> = conn.get(current_room_key(user_id)).await?;

        let mut pipe = redis::pipe();
        pipe.atomic().del(presence_key(room_id, user_id)).ignore();
        if current == Some(room_id) {
            pipe.del(current_room_key(user_id)).ignore();
        }
        pipe.query_async::<()>(&mut *conn).await?;

        tracing::debug!(room_id = %room_id, user_id = %user_id, "Presence removed");
        Ok(removed > 0)
    }

    async fn update_position(
        &self,
        user_id: UserId,
        room_id: RoomId,
        x: i32,
        y: i32,
    ) -> Result<Option<RoomUser>> {
        let mut conn = self.pool.get().await?;
        let key = presence_key(room_id, user_id);
        let current_key = current_room_key(user_id);

        for _ in 0..MAX_TX_ATTEMPTS {
            // A concurrent leave or room switch aborts the EXEC below
            redis::cmd("WATCH")
                .arg(&key)
                .arg(&current_key)
                .query_async::<()>(&mut *conn)
                .await?;

            let fields: HashMap<String, String> = conn.hgetall(&key).await?;
            let current: Option<i64> = conn.get(&current_key).await?;

            let record = parse_presence(room_id, user_id, &fields).filter(|_| current == Some(room_id));
            let Some(mut record) = record else {
                redis::cmd("UNWATCH").query_async::<()>(&mut *conn).await?;
                return Ok(None);
            };

            record.x = x;
            record.y = y;
            record.last_seen = Utc::now();

            let mut pipe = redis::pipe();
            pipe.atomic();
            queue_presence(&mut pipe, &record, self.presence_ttl_seconds);

            // Nil when a watched key changed
            let committed: Option<()> = pipe.query_async(&mut *conn).await?;
            if committed.is_some() {
                return Ok(Some(record));
            }
            tracing::debug!(room_id = %room_id, user_id = %user_id, "Position update raced, retrying");
        }

        Err(AppError::Conflict("Presence is being modified".to_string()))
    }

    async fn room_users(&self, room_id: RoomId) -> Result<Vec<RoomUser>> {
        let mut user_ids: Vec<i64> = {
            let mut conn = self.pool.get().await?;
            conn.smembers(room_users_key(room_id)).await?
        };
        user_ids.sort_unstable();

        let mut users = Vec::with_capacity(user_ids.len());
        let mut expired = Vec::new();
        for user_id in user_ids {
            match self.read_presence(room_id, user_id).await? {
                Some(record) => users.push(record),
                None => expired.push(user_id),
            }
        }

        // Presence hashes expire on their own; drop the dangling set members
        if !expired.is_empty() {
            let mut conn = self.pool.get().await?;
            conn.srem::<_, _, ()>(room_users_key(room_id), expired).await?;
        }

        Ok(users)
    }
}
