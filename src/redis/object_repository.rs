use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::error::Result;
use crate::models::{NewObject, ObjectId, ObjectType, RoomId, RoomObject};
use crate::store::ObjectStore;

const NEXT_OBJECT_ID: &str = "objects:next_id";
const OBJECT_INDEX: &str = "objects";

fn object_key(object_id: ObjectId) -> String {
    format!("object:{}", object_id)
}

fn room_objects_key(room_id: RoomId) -> String {
    format!("room:{}:objects", room_id)
}

/// Placed objects, indexed globally and per room
#[derive(Clone)]
pub struct ObjectRepository {
    pool: Pool,
}

impl ObjectRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn load_sorted(&self, index_key: String) -> Result<Vec<RoomObject>> {
        let mut ids: Vec<i64> = {
            let mut conn = self.pool.get().await?;
            conn.smembers(index_key).await?
        };
        ids.sort_unstable();

        let mut objects = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(object) = self.get_object(id).await? {
                objects.push(object);
            }
        }
        Ok(objects)
    }
}

#[async_trait]
impl ObjectStore for ObjectRepository {
    async fn create_object(&self, object: NewObject) -> Result<RoomObject> {
        let mut conn = self.pool.get().await?;

        let id: i64 = conn.incr(NEXT_OBJECT_ID, 1).await?;
        let object = RoomObject {
            id,
            room_id: object.room_id,
            object_type: object.object_type,
            x: object.x,
            y: object.y,
            rotation: object.rotation,
            metadata: object.metadata,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&object)?;

        redis::pipe()
            .atomic()
            .set(object_key(id), json)
            .ignore()
            .sadd(OBJECT_INDEX, id)
            .ignore()
            .sadd(room_objects_key(object.room_id), id)
            .ignore()
            .query_async::<()>(&mut *conn)
            .await?;

        tracing::debug!(object_id = %id, room_id = %object.room_id, "Object placed");
        Ok(object)
    }

    async fn get_object(&self, object_id: ObjectId) -> Result<Option<RoomObject>> {
        let mut conn = self.pool.get().await?;

        let json: Option<String> = conn.get(object_key(object_id)).await?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn list_objects(
        &self,
        skip: usize,
        limit: usize,
        object_type: Option<ObjectType>,
    ) -> Result<Vec<RoomObject>> {
        Ok(self
            .load_sorted(OBJECT_INDEX.to_string())
            .await?
            .into_iter()
            .filter(|o| object_type.map_or(true, |t| o.object_type == t))
            .skip(skip)
            .take(limit)
            .collect())
    }

    async fn room_objects(&self, room_id: RoomId, skip: usize, limit: usize) -> Result<Vec<RoomObject>> {
        Ok(self
            .load_sorted(room_objects_key(room_id))
            .await?
            .into_iter()
            .skip(skip)
            .take(limit)
            .collect())
    }
}
