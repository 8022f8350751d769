use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::models::{ChatLog, ObjectId, RoomId, ToolAction, ToolsLog, UserId};
use crate::store::{ChatStore, ToolsStore};

const NEXT_CHAT_ID: &str = "chat:next_id";
const NEXT_TOOLS_ID: &str = "tools:next_id";

fn chat_key(room_id: RoomId) -> String {
    format!("room:{}:chat", room_id)
}

fn tools_key(room_id: RoomId) -> String {
    format!("room:{}:tools", room_id)
}

fn user_tools_key(user_id: UserId) -> String {
    format!("user:{}:tools", user_id)
}

/// LRANGE bounds for a page; `None` when the page cannot intersect any list
fn lrange_bounds(skip: usize, limit: usize) -> Option<(isize, isize)> {
    if limit == 0 {
        return None;
    }
    let start = isize::try_from(skip).ok()?;
    let stop = start.checked_add(isize::try_from(limit - 1).ok()?)?;
    Some((start, stop))
}

/// Append-only chat and tool-usage logs, one Redis list per room (newest at the head)
#[derive(Clone)]
pub struct LogRepository {
    pool: Pool,
}

impl LogRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn page<T: DeserializeOwned>(&self, key: String, skip: usize, limit: usize) -> Result<Vec<T>> {
        let Some((start, stop)) = lrange_bounds(skip, limit) else {
            return Ok(Vec::new());
        };

        let mut conn = self.pool.get().await?;
        let raw: Vec<String> = conn.lrange(key, start, stop).await?;

        Ok(raw
            .iter()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect())
    }
}

#[async_trait]
impl ChatStore for LogRepository {
    async fn append_message(&self, room_id: RoomId, user_id: UserId, message: &str) -> Result<ChatLog> {
        let mut conn = self.pool.get().await?;

        let id: i64 = conn.incr(NEXT_CHAT_ID, 1).await?;
        let log = ChatLog {
            id,
            room_id,
            user_id,
            message: message.to_string(),
            created_at: Utc::now(),
        };
        conn.lpush::<_, _, ()>(chat_key(room_id), serde_json::to_string(&log)?)
            .await?;

        Ok(log)
    }

    async fn room_messages(&self, room_id: RoomId, skip: usize, limit: usize) -> Result<Vec<ChatLog>> {
        self.page(chat_key(room_id), skip, limit).await
    }
}

#[async_trait]
impl ToolsStore for LogRepository {
    async fn record_usage(
        &self,
        user_id: UserId,
        room_id: RoomId,
        target_object_id: ObjectId,
        action: ToolAction,
    ) -> Result<ToolsLog> {
        let mut conn = self.pool.get().await?;

        let id: i64 = conn.incr(NEXT_TOOLS_ID, 1).await?;
        let log = ToolsLog {
            id,
            user_id,
            room_id,
            target_object_id,
            action,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&log)?;

        redis::pipe()
            .atomic()
            .lpush(tools_key(room_id), &json)
            .ignore()
            .lpush(user_tools_key(user_id), &json)
            .ignore()
            .query_async::<()>(&mut *conn)
            .await?;

        Ok(log)
    }

    async fn room_logs(&self, room_id: RoomId, skip: usize, limit: usize) -> Result<Vec<ToolsLog>> {
        self.page(tools_key(room_id), skip, limit).await
    }

    async fn user_logs(&self, user_id: UserId, skip: usize, limit: usize) -> Result<Vec<ToolsLog>> {
        self.page(user_tools_key(user_id), skip, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lrange_bounds() {
        assert_eq!(lrange_bounds(0, 100), Some((0, 99)));
        assert_eq!(lrange_bounds(20, 10), Some((20, 29)));
        assert_eq!(lrange_bounds(5, 0), None);
    }

    #[test]
    fn test_lrange_bounds_reject_huge_skip() {
        // Must never wrap into negative (tail-relative) indexes
        assert_eq!(lrange_bounds(usize::MAX, 100), None);
        assert_eq!(lrange_bounds(isize::MAX as usize + 1, 1), None);
        assert_eq!(lrange_bounds(isize::MAX as usize - 10, 100), None);
        assert_eq!(lrange_bounds(isize::MAX as usize, 1), Some((isize::MAX, isize::MAX)));
    }
}
