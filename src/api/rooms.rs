use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::api::{AuthUser, PageQuery};
use crate::error::{AppError, Result};
use crate::models::{CreateRoomRequest, Room, RoomId, RoomInfo};
use crate::state::AppState;
use crate::store::page_limit;

const MAX_ROOM_NAME_LEN: usize = 100;

/// Room routes
pub fn room_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/{room_id}", get(get_room))
}

/// POST /api/v1/rooms - Create a new room
async fn create_room(
    State(state): State<AppState>,
    AuthUser(owner): AuthUser,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Room>)> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Room name is required".to_string()));
    }
    if name.chars().count() > MAX_ROOM_NAME_LEN {
        return Err(AppError::BadRequest(
            "Room name must be at most 100 characters".to_string(),
        ));
    }

    let room = state
        .stores
        .rooms
        .create_room(name, owner.id, request.is_private)
        .await?;

    tracing::info!(room_id = %room.id, name = %room.name, owner_id = %owner.id, "Room created");

    Ok((StatusCode::CREATED, Json(room)))
}

/// GET /api/v1/rooms - List public rooms
async fn list_rooms(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Room>>> {
    let rooms = state
        .stores
        .rooms
        .list_rooms(page.skip, page_limit(page.limit), true)
        .await?;

    Ok(Json(rooms))
}

/// GET /api/v1/rooms/:room_id - Room details with live connection count
async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RoomInfo>> {
    let room = state
        .stores
        .rooms
        .get_room(room_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Room not found".to_string()))?;

    Ok(Json(RoomInfo {
        online_count: state.registry.member_count(room_id),
        room,
    }))
}
