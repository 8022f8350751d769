pub mod inventory_repository;
pub mod log_repository;
pub mod object_repository;
pub mod room_repository;
pub mod user_repository;

pub use inventory_repository::InventoryRepository;
pub use log_repository::LogRepository;
pub use object_repository::ObjectRepository;
pub use room_repository::RoomRepository;
pub use user_repository::UserRepository;

use std::sync::Arc;

use deadpool_redis::{Config as RedisConfig, Pool, Runtime};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::store::Stores;

/// Retries for WATCH/MULTI transactions aborted by a concurrent writer
pub(crate) const MAX_TX_ATTEMPTS: usize = 5;

/// Create a Redis connection pool
pub fn create_pool(config: &Config) -> Result<Pool> {
    let redis_config = RedisConfig::from_url(&config.redis_url);
    let pool = redis_config
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| AppError::RedisError(format!("Failed to create Redis pool: {}", e)))?;

    Ok(pool)
}

/// Wire every store trait to Redis repositories sharing one pool
pub fn redis_stores(pool: Pool, config: &Config) -> Stores {
    let logs = Arc::new(LogRepository::new(pool.clone()));
    Stores {
        users: Arc::new(UserRepository::new(pool.clone())),
        rooms: Arc::new(RoomRepository::new(pool.clone(), config.position_ttl_seconds)),
        chat: logs.clone(),
        tools: logs,
        objects: Arc::new(ObjectRepository::new(pool.clone())),
        inventory: Arc::new(InventoryRepository::new(pool)),
    }
}

/// Check Redis connection health
pub async fn health_check(pool: &Pool) -> Result<bool> {
    let mut conn = pool.get().await?;

    let pong: String = redis::cmd("PING")
        .query_async(&mut *conn)
        .await
        .map_err(|e| AppError::RedisError(e.to_string()))?;

    Ok(pong == "PONG")
}
