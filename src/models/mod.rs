pub mod log;
pub mod object;
pub mod room;
pub mod user;

pub use log::{ChatLog, ToolAction, ToolsLog};
pub use object::{
    AddInventoryItemRequest, InventoryItem, Metadata, NewObject, ObjectType, PlaceItemRequest, RoomObject,
};
pub use room::{CreateRoomRequest, Room, RoomInfo, RoomUser};
pub use user::{Claims, RegisterRequest, TokenRequest, TokenResponse, UpdateUserRequest, User};

/// Numeric identifiers shared by every store
pub type UserId = i64;
pub type RoomId = i64;
pub type ObjectId = i64;
