use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::api::AuthUser;
use crate::error::{AppError, Result};
use crate::models::{AddInventoryItemRequest, InventoryItem, NewObject, PlaceItemRequest};
use crate::state::AppState;

/// Inventory routes; every route acts on the caller's own items
pub fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items).post(add_item))
        .route("/place", post(place_item))
}

/// GET /api/v1/inventory
async fn list_items(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<Vec<InventoryItem>>> {
    Ok(Json(state.stores.inventory.list_items(user.id).await?))
}

/// POST /api/v1/inventory
async fn add_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<AddInventoryItemRequest>,
) -> Result<(StatusCode, Json<InventoryItem>)> {
    if request.quantity == 0 {
        return Err(AppError::BadRequest("Quantity must be at least 1".to_string()));
    }

    let item = state
        .stores
        .inventory
        .add_item(user.id, request.object_type, request.quantity, request.metadata)
        .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// POST /api/v1/inventory/place - Turn one unit of an item into a placed object
async fn place_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<PlaceItemRequest>,
) -> Result<Json<Value>> {
    if !state.stores.rooms.room_exists(request.room_id).await? {
        return Err(AppError::NotFound("Room not found".to_string()));
    }

    let item = state
        .stores
        .inventory
        .take_item(user.id, request.inventory_item_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Inventory item not found".to_string()))?;

    let object = state
        .stores
        .objects
        .create_object(NewObject {
            room_id: request.room_id,
            object_type: item.object_type,
            x: request.x,
            y: request.y,
            rotation: request.rotation,
            metadata: item.metadata,
        })
        .await?;

    tracing::info!(
        user_id = %user.id,
        item_id = %item.id,
        object_id = %object.id,
        room_id = %object.room_id,
        "Inventory item placed"
    );
    Ok(Json(json!({ "status": "ok", "object_id": object.id })))
}
