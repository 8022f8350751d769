use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AuthUser;
use crate::error::{AppError, Result};
use crate::models::{RoomId, RoomUser};
use crate::state::AppState;

/// `?x=&y=` on join; both default to the origin
#[derive(Debug, Default, Deserialize)]
struct JoinQuery {
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
}

/// `?x=&y=` on position updates
#[derive(Debug, Deserialize)]
struct PositionQuery {
    x: i32,
    y: i32,
}

pub fn room_user_routes() -> Router<AppState> {
    Router::new()
        .route("/room/{room_id}", get(list_room_users))
        .route("/room/{room_id}/join", post(join_room))
        .route("/room/{room_id}/leave", post(leave_room))
        .route("/room/{room_id}/position", put(update_position))
}

async fn ensure_room(state: &AppState, room_id: RoomId) -> Result<()> {
    if state.stores.rooms.room_exists(room_id).await? {
        Ok(())
    } else {
        Err(AppError::NotFound("Room not found".to_string()))
    }
}

/// GET /api/v1/room-users/room/:room_id - Persistent presence records
async fn list_room_users(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<Vec<RoomUser>>> {
    ensure_room(&state, room_id).await?;

    Ok(Json(state.stores.rooms.room_users(room_id).await?))
}

/// POST /api/v1/room-users/room/:room_id/join - Presence only; live peers are
/// notified through the WebSocket `join_room` event
async fn join_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<RoomId>,
    Query(query): Query<JoinQuery>,
) -> Result<Json<RoomUser>> {
    ensure_room(&state, room_id).await?;

    let record = state
        .stores
        .rooms
        .join_room(user.id, room_id, query.x, query.y)
        .await?;

    Ok(Json(record))
}

/// POST /api/v1/room-users/room/:room_id/leave
async fn leave_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<RoomId>,
) -> Result<Json<Value>> {
    ensure_room(&state, room_id).await?;

    state.stores.rooms.leave_room(user.id, room_id).await?;

    Ok(Json(json!({ "message": "Successfully left room" })))
}

/// PUT /api/v1/room-users/room/:room_id/position
async fn update_position(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<RoomId>,
    Query(query): Query<PositionQuery>,
) -> Result<Json<RoomUser>> {
    ensure_room(&state, room_id).await?;

    let record = state
        .stores
        .rooms
        .update_position(user.id, room_id, query.x, query.y)
        .await?
        .ok_or_else(|| AppError::NotFound("User is not in this room".to_string()))?;

    Ok(Json(record))
}
