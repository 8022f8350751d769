use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::{AuthUser, PageQuery};
use crate::error::{AppError, Result};
use crate::models::{ChatLog, RoomId};
use crate::state::AppState;
use crate::store::page_limit;

/// `?message=`
#[derive(Debug, Deserialize)]
struct SendQuery {
    message: String,
}

pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/room/{room_id}", get(room_history).post(send_message))
}

/// GET /api/v1/chat/room/:room_id - Chat history, newest first
async fn room_history(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<ChatLog>>> {
    let messages = state
        .stores
        .chat
        .room_messages(room_id, page.skip, page_limit(page.limit))
        .await?;

    Ok(Json(messages))
}

/// POST /api/v1/chat/room/:room_id - Store a message without a live broadcast
async fn send_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<RoomId>,
    Query(query): Query<SendQuery>,
) -> Result<(StatusCode, Json<ChatLog>)> {
    if query.message.trim().is_empty() {
        return Err(AppError::BadRequest("Message must not be empty".to_string()));
    }
    if !state.stores.rooms.room_exists(room_id).await? {
        return Err(AppError::NotFound("Room not found".to_string()));
    }

    let log = state
        .stores
        .chat
        .append_message(room_id, user.id, &query.message)
        .await?;

    Ok((StatusCode::CREATED, Json(log)))
}
