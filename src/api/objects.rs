use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::{AuthUser, PageQuery};
use crate::error::{AppError, Result};
use crate::models::{NewObject, ObjectId, ObjectType, RoomId, RoomObject};
use crate::state::AppState;
use crate::store::page_limit;

/// `?skip=&limit=&type=`
#[derive(Debug, Default, Deserialize)]
struct ObjectQuery {
    #[serde(default)]
    skip: usize,
    limit: Option<usize>,
    #[serde(rename = "type")]
    object_type: Option<ObjectType>,
}

/// Placed object routes
pub fn object_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_objects).post(create_object))
        .route("/{object_id}", get(get_object))
        .route("/room/{room_id}", get(room_objects))
}

/// GET /api/v1/objects
async fn list_objects(
    State(state): State<AppState>,
    Query(query): Query<ObjectQuery>,
) -> Result<Json<Vec<RoomObject>>> {
    let objects = state
        .stores
        .objects
        .list_objects(query.skip, page_limit(query.limit), query.object_type)
        .await?;

    Ok(Json(objects))
}

/// POST /api/v1/objects
async fn create_object(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<NewObject>,
) -> Result<(StatusCode, Json<RoomObject>)> {
    if !state.stores.rooms.room_exists(request.room_id).await? {
        return Err(AppError::NotFound("Room not found".to_string()));
    }

    let object = state.stores.objects.create_object(request).await?;

    tracing::info!(
        object_id = %object.id,
        room_id = %object.room_id,
        user_id = %user.id,
        "Object created"
    );
    Ok((StatusCode::CREATED, Json(object)))
}

/// GET /api/v1/objects/:object_id
async fn get_object(
    State(state): State<AppState>,
    Path(object_id): Path<ObjectId>,
) -> Result<Json<RoomObject>> {
    let object = state
        .stores
        .objects
        .get_object(object_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Object not found".to_string()))?;

    Ok(Json(object))
}

/// GET /api/v1/objects/room/:room_id
async fn room_objects(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<RoomObject>>> {
    if !state.stores.rooms.room_exists(room_id).await? {
        return Err(AppError::NotFound("Room not found".to_string()));
    }

    let objects = state
        .stores
        .objects
        .room_objects(room_id, page.skip, page_limit(page.limit))
        .await?;

    Ok(Json(objects))
}
