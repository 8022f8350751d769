use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::{AuthUser, PageQuery};
use crate::error::{AppError, Result};
use crate::models::{ObjectId, RoomId, ToolAction, ToolsLog, UserId};
use crate::state::AppState;
use crate::store::{ensure_object_in_room, page_limit};

/// `?room_id=&target_object_id=&action=`
#[derive(Debug, Deserialize)]
struct UseToolQuery {
    room_id: RoomId,
    target_object_id: ObjectId,
    action: ToolAction,
}

pub fn tools_routes() -> Router<AppState> {
    Router::new()
        .route("/use", post(use_tool))
        .route("/user/{user_id}", get(user_tool_logs))
        .route("/room/{room_id}", get(room_tool_logs))
}

/// POST /api/v1/tools/use
async fn use_tool(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<UseToolQuery>,
) -> Result<(StatusCode, Json<ToolsLog>)> {
    if !state.stores.rooms.room_exists(query.room_id).await? {
        return Err(AppError::NotFound("Room not found".to_string()));
    }
    ensure_object_in_room(state.stores.objects.as_ref(), query.room_id, query.target_object_id).await?;

    let log = state
        .stores
        .tools
        .record_usage(user.id, query.room_id, query.target_object_id, query.action)
        .await?;

    Ok((StatusCode::CREATED, Json(log)))
}

/// GET /api/v1/tools/user/:user_id - Only the caller's own history
async fn user_tool_logs(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(user_id): Path<UserId>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<ToolsLog>>> {
    if user.id != user_id {
        return Err(AppError::Forbidden(
            "Not authorized to view this user's logs".to_string(),
        ));
    }

    let logs = state
        .stores
        .tools
        .user_logs(user_id, page.skip, page_limit(page.limit))
        .await?;

    Ok(Json(logs))
}

/// GET /api/v1/tools/room/:room_id
async fn room_tool_logs(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<ToolsLog>>> {
    let logs = state
        .stores
        .tools
        .room_logs(room_id, page.skip, page_limit(page.limit))
        .await?;

    Ok(Json(logs))
}
