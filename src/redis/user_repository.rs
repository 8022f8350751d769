use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::error::{AppError, Result};
use crate::models::{User, UserId};
use crate::store::UserStore;

const NEXT_USER_ID: &str = "users:next_id";
const USER_INDEX: &str = "users";

fn user_key(user_id: UserId) -> String {
    format!("user:{}", user_id)
}

fn username_key(username: &str) -> String {
    format!("user:username:{}", username)
}

/// User records in Redis
#[derive(Clone)]
pub struct UserRepository {
    pool: Pool,
}

impl UserRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn create_user(&self, username: &str, avatar_url: Option<&str>) -> Result<User> {
        let mut conn = self.pool.get().await?;

        let id: i64 = conn.incr(NEXT_USER_ID, 1).await?;

        // Claim the username before writing the record
        let claimed: bool = conn.set_nx(username_key(username), id).await?;
        if !claimed {
            return Err(AppError::Conflict("Username already registered".to_string()));
        }

        let user = User {
            id,
            username: username.to_string(),
            avatar_url: avatar_url.map(str::to_string),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user)?;

        redis::pipe()
            .atomic()
            .set(user_key(id), json)
            .ignore()
            .sadd(USER_INDEX, id)
            .ignore()
            .query_async::<()>(&mut *conn)
            .await?;

        tracing::info!(user_id = %id, username = %username, "User created");
        Ok(user)
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let mut conn = self.pool.get().await?;

        let json: Option<String> = conn.get(user_key(user_id)).await?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let id: Option<i64> = {
            let mut conn = self.pool.get().await?;
            conn.get(username_key(username)).await?
        };

        match id {
            Some(id) => self.get_user(id).await,
            None => Ok(None),
        }
    }

    async fn list_users(&self, skip: usize, limit: usize) -> Result<Vec<User>> {
        let mut ids: Vec<i64> = {
            let mut conn = self.pool.get().await?;
            conn.smembers(USER_INDEX).await?
        };
        ids.sort_unstable();

        let mut users = Vec::new();
        for id in ids.into_iter().skip(skip).take(limit) {
            if let Some(user) = self.get_user(id).await? {
                users.push(user);
            }
        }

        Ok(users)
    }

    async fn update_user(
        &self,
        user_id: UserId,
        username: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<Option<User>> {
        let Some(mut user) = self.get_user(user_id).await? else {
            return Ok(None);
        };
        let mut conn = self.pool.get().await?;

        let previous_name = user.username.clone();
        if let Some(new_name) = username.filter(|name| *name != previous_name) {
            let claimed: bool = conn.set_nx(username_key(new_name), user_id).await?;
            if !claimed {
                return Err(AppError::Conflict("Username already registered".to_string()));
            }
            user.username = new_name.to_string();
        }
        if let Some(url) = avatar_url {
            user.avatar_url = Some(url.to_string());
        }

        let json = serde_json::to_string(&user)?;
        let mut pipe = redis::pipe();
        pipe.atomic().set(user_key(user_id), json).ignore();
        if user.username != previous_name {
            pipe.del(username_key(&previous_name)).ignore();
        }
        pipe.query_async::<()>(&mut *conn).await?;

        tracing::info!(user_id = %user_id, username = %user.username, "User updated");
        Ok(Some(user))
    }

    async fn delete_user(&self, user_id: UserId) -> Result<bool> {
        let Some(user) = self.get_user(user_id).await? else {
            return Ok(false);
        };
        let mut conn = self.pool.get().await?;

        redis::pipe()
            .atomic()
            .del(user_key(user_id))
            .ignore()
            .del(username_key(&user.username))
            .ignore()
            .srem(USER_INDEX, user_id)
            .ignore()
            .query_async::<()>(&mut *conn)
            .await?;

        tracing::info!(user_id = %user_id, "User deleted");
        Ok(true)
    }
}
