pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod redis;
pub mod state;
pub mod store;
pub mod ws;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Full HTTP + WebSocket application for the given state
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(api::create_router(state.clone()))
        .merge(ws::ws_routes().with_state(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
