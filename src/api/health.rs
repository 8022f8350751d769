use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::error::Result;
use crate::state::AppState;

/// Health response structure
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
    pub connections: usize,
    pub timestamp: String,
}

/// Health routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// GET /health - Health check endpoint
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let storage_status = match &state.redis_pool {
        Some(pool) => match crate::redis::health_check(pool).await {
            Ok(true) => "connected",
            Ok(false) => "error",
            Err(_) => "disconnected",
        },
        None => "memory",
    };

    let overall_status = if matches!(storage_status, "connected" | "memory") {
        "healthy"
    } else {
        "unhealthy"
    };

    Ok(Json(HealthResponse {
        status: overall_status.to_string(),
        storage: storage_status.to_string(),
        connections: state.registry.session_count(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}
