//! API routes definition

use super::handlers;
use super::state::AppState;
use axum::{routing::get, Router};
use std::sync::Arc;

/// Build the router with the socket endpoint and the read-only HTTP API
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Real-time events
        .route("/socket", get(handlers::websocket::ws_handler))
        // Health
        .route("/health", get(handlers::http::health))
        // Read-only views
        .route("/api/online", get(handlers::http::online_users))
        .route("/api/users/:id", get(handlers::http::get_user))
        .route("/api/messages", get(handlers::http::get_messages))
        .with_state(state)
}
