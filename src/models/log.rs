use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ObjectId, RoomId, UserId};

/// Stored chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLog {
    pub id: i64,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// What a tool did to its target object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolAction {
    Destroy,
    Move,
}

/// Stored tool usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsLog {
    pub id: i64,
    pub user_id: UserId,
    pub room_id: RoomId,
    pub target_object_id: ObjectId,
    pub action: ToolAction,
    pub created_at: DateTime<Utc>,
}
