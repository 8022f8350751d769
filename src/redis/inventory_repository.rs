use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::error::{AppError, Result};
use crate::models::{InventoryItem, Metadata, ObjectType, UserId};
use crate::redis::MAX_TX_ATTEMPTS;
use crate::store::InventoryStore;

const NEXT_ITEM_ID: &str = "inventory:next_id";

fn item_key(item_id: i64) -> String {
    format!("inventory:item:{}", item_id)
}

fn user_items_key(user_id: UserId) -> String {
    format!("user:{}:inventory", user_id)
}

/// Per-user inventory items
#[derive(Clone)]
pub struct InventoryRepository {
    pool: Pool,
}

impl InventoryRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryStore for InventoryRepository {
    async fn list_items(&self, user_id: UserId) -> Result<Vec<InventoryItem>> {
        let mut conn = self.pool.get().await?;

        let mut ids: Vec<i64> = conn.smembers(user_items_key(user_id)).await?;
        ids.sort_unstable();

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let json: Option<String> = conn.get(item_key(id)).await?;
            if let Some(data) = json {
                items.push(serde_json::from_str(&data)?);
            }
        }
        Ok(items)
    }

    async fn add_item(
        &self,
        user_id: UserId,
        object_type: ObjectType,
        quantity: u32,
        metadata: Option<Metadata>,
    ) -> Result<InventoryItem> {
        let mut conn = self.pool.get().await?;

        let id: i64 = conn.incr(NEXT_ITEM_ID, 1).await?;
        let item = InventoryItem {
            id,
            user_id,
            object_type,
            quantity,
            metadata,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&item)?;

        redis::pipe()
            .atomic()
            .set(item_key(id), json)
            .ignore()
            .sadd(user_items_key(user_id), id)
            .ignore()
            .query_async::<()>(&mut *conn)
            .await?;

        Ok(item)
    }

    async fn take_item(&self, user_id: UserId, item_id: i64) -> Result<Option<InventoryItem>> {
        let mut conn = self.pool.get().await?;
        let key = item_key(item_id);

        for _ in 0..MAX_TX_ATTEMPTS {
            redis::cmd("WATCH").arg(&key).query_async::<()>(&mut *conn).await?;

            let json: Option<String> = conn.get(&key).await?;
            let item = match json {
                Some(data) => Some(serde_json::from_str::<InventoryItem>(&data)?),
                None => None,
            };
            let Some(before) = item.filter(|item| item.user_id == user_id) else {
                redis::cmd("UNWATCH").query_async::<()>(&mut *conn).await?;
                return Ok(None);
            };

            let mut pipe = redis::pipe();
            pipe.atomic();
            if before.quantity > 1 {
                let remaining = InventoryItem {
                    quantity: before.quantity - 1,
                    ..before.clone()
                };
                pipe.set(&key, serde_json::to_string(&remaining)?).ignore();
            } else {
                pipe.del(&key)
                    .ignore()
                    .srem(user_items_key(user_id), item_id)
                    .ignore();
            }

            // Nil when the watched item changed underneath us
            let committed: Option<()> = pipe.query_async(&mut *conn).await?;
            if committed.is_some() {
                return Ok(Some(before));
            }
        }

        Err(AppError::Conflict("Inventory item is being modified".to_string()))
    }
}
