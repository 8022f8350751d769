use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RoomId, UserId};

/// Room metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub owner_id: UserId,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

/// Persistent "user is in this room at (x, y)" record.
/// Authoritative for REST reads only; live routing uses the session registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomUser {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub x: i32,
    pub y: i32,
    pub last_seen: DateTime<Utc>,
}

/// Request to create a room
#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
}

/// Room information returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct RoomInfo {
    #[serde(flatten)]
    pub room: Room,
    /// Live connections currently joined to the room
    pub online_count: usize,
}
