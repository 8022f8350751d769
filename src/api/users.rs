use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use crate::api::auth::{create_user, validate_username};
use crate::api::{AuthUser, PageQuery};
use crate::error::{AppError, Result};
use crate::models::{RegisterRequest, UpdateUserRequest, User, UserId};
use crate::state::AppState;
use crate::store::page_limit;

/// User profile routes
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_new_user))
        .route("/me", get(read_me).put(update_me).delete(delete_me))
        .route("/{user_id}", get(read_user))
}

/// GET /api/v1/users
async fn list_users(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<User>>> {
    let users = state
        .stores
        .users
        .list_users(page.skip, page_limit(page.limit))
        .await?;

    Ok(Json(users))
}

/// POST /api/v1/users
async fn create_new_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let user = create_user(&state, &request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/v1/users/me
async fn read_me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

/// GET /api/v1/users/:user_id
async fn read_user(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(user_id): Path<UserId>,
) -> Result<Json<User>> {
    let user = state
        .stores
        .users
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// PUT /api/v1/users/me - Change username and/or avatar.
/// Live sessions keep the identity they authenticated with until they reconnect.
async fn update_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>> {
    let username = request.username.as_deref().map(validate_username).transpose()?;

    let updated = state
        .stores
        .users
        .update_user(user.id, username, request.avatar_url.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = %updated.id, username = %updated.username, "User updated");
    Ok(Json(updated))
}

/// DELETE /api/v1/users/me
async fn delete_me(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<Value>> {
    if !state.stores.users.delete_user(user.id).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = %user.id, "User deleted");
    Ok(Json(json!({ "message": "User deleted successfully" })))
}
