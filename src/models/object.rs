use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ObjectId, RoomId, UserId};

/// Free-form attributes attached to objects and inventory items
pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Chair,
    Table,
    Desk,
    Plant,
    Balloon,
    Pot,
    Brick,
    Wall,
    Tool,
}

/// Object placed in a room; the target of tool actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomObject {
    pub id: ObjectId,
    pub room_id: RoomId,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub x: i32,
    pub y: i32,
    pub rotation: f64,
    pub metadata: Option<Metadata>,
    pub created_at: DateTime<Utc>,
}

/// Fields of a new object; also produced when an inventory item is placed
#[derive(Debug, Clone, Deserialize)]
pub struct NewObject {
    pub room_id: RoomId,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// Item a user owns but has not placed yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: i64,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub quantity: u32,
    pub metadata: Option<Metadata>,
    pub created_at: DateTime<Utc>,
}

/// POST /inventory body
#[derive(Debug, Deserialize)]
pub struct AddInventoryItemRequest {
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

fn one() -> u32 {
    1
}

/// POST /inventory/place body
#[derive(Debug, Deserialize)]
pub struct PlaceItemRequest {
    pub inventory_item_id: i64,
    pub room_id: RoomId,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub rotation: f64,
}
