use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    routing::post,
    Json, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::error::{AppError, Result};
use crate::models::{RegisterRequest, TokenRequest, TokenResponse, User};
use crate::state::AppState;

const MAX_USERNAME_LEN: usize = 50;

/// Auth routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/token", post(issue_token))
}

/// The user behind a valid `Authorization: Bearer` header
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized("Missing bearer token".to_string()))?;

        let user = state.auth_resolver.resolve(bearer.token()).await?;
        Ok(AuthUser(user))
    }
}

/// POST /api/v1/auth/register - Create a user
async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let user = create_user(&state, &request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Trimmed username, 1..=50 characters
pub(crate) fn validate_username(raw: &str) -> Result<&str> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(AppError::BadRequest("Username is required".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::BadRequest(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }
    Ok(username)
}

/// Shared by /auth/register and POST /users
pub(crate) async fn create_user(state: &AppState, request: &RegisterRequest) -> Result<User> {
    let username = validate_username(&request.username)?;

    let user = state
        .stores
        .users
        .create_user(username, request.avatar_url.as_deref())
        .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");
    Ok(user)
}

/// POST /api/v1/auth/token - Issue an access token.
/// There are no passwords yet: any existing username gets a token.
async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenResponse>> {
    let user = state
        .stores
        .users
        .get_user_by_username(request.username.trim())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Incorrect username".to_string()))?;

    let access_token = state.auth.generate_token(&user.username)?;

    tracing::debug!(user_id = %user.id, "Access token issued");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}
