//! Read-only HTTP views over presence, users and history

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use parley_core::core_presence::PresenceEntry;
use parley_core::core_store::{MessageFilter, MessageStore, StoredMessage, UserRecord, UserStore};
use parley_core::UserId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Upper bound on one history page
const MAX_HISTORY: usize = 500;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub online_users: usize,
    pub connections: usize,
    pub shutting_down: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user: String,
    pub peer: String,
    pub limit: Option<usize>,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let shutting_down = state.shutdown.is_shutting_down().await;
    Json(HealthResponse {
        status: if shutting_down { "draining" } else { "ok" }.to_string(),
        online_users: state.hub.registry().len().await,
        connections: state.connection_count(),
        shutting_down,
    })
}

/// GET /api/online - registry snapshot
pub async fn online_users(State(state): State<Arc<AppState>>) -> Json<Vec<PresenceEntry>> {
    Json(state.hub.registry().snapshot().await)
}

/// GET /api/users/:id - user record with friends and request lists
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserRecord>> {
    let user_id = UserId::new(user_id);
    let record = state
        .hub
        .users()
        .find_user(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("user {} not found", user_id)))?;
    Ok(Json(record))
}

/// GET /api/messages?user=..&peer=..&limit=.. - conversation history, oldest first
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<StoredMessage>>> {
    let (user, peer) = (UserId::new(query.user), UserId::new(query.peer));
    if user.is_empty() || peer.is_empty() {
        return Err(ApiError::bad_request("user and peer are required"));
    }

    let limit = query.limit.unwrap_or(MAX_HISTORY).min(MAX_HISTORY);
    let filter = MessageFilter::between(user, peer).with_limit(limit);
    let messages = state.hub.messages().find_messages(&filter).await?;
    Ok(Json(messages))
}
