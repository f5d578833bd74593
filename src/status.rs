use axum::{
    debug_handler,
    extract::{Query, State},
    http::{StatusCode, Uri},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    history::{MessageStore, DEFAULT_RECENT_LIMIT},
    now_iso8601, AppResult, AppState, BrokerError, SharedBroker, StartedAt,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/stats", get(stats))
        .route("/api/messages/recent", get(recent))
        .route("/api/messages/search", get(search))
}

#[debug_handler(state = AppState)]
pub async fn health(State(StartedAt(started_at)): State<StartedAt>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": now_iso8601(),
        "uptime": started_at.elapsed().as_secs_f64(),
    }))
}

#[debug_handler(state = AppState)]
pub async fn stats(State(broker): State<SharedBroker>) -> Json<Value> {
    let broker = broker.lock().await;
    Json(json!({
        "connectedUsers": broker.hub.connection_count(),
        "registeredUsers": broker.sessions.user_count(),
        "rooms": broker.sessions.room_count(),
        "messages": broker.history.total_count(),
        "timestamp": now_iso8601(),
    }))
}

pub async fn not_found(uri: Uri) -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found", "path": uri.path() })))
}

#[derive(Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

#[debug_handler(state = AppState)]
pub async fn recent(
    State(broker): State<SharedBroker>,
    Query(RecentQuery { limit }): Query<RecentQuery>,
) -> Json<Value> {
    let broker = broker.lock().await;
    let messages: Vec<_> = broker
        .history
        .recent(limit.unwrap_or(DEFAULT_RECENT_LIMIT))
        .iter()
        .map(MessageStore::format)
        .collect();
    Json(json!({ "messages": messages }))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub room: Option<String>,
}

#[debug_handler(state = AppState)]
pub async fn search(
    State(broker): State<SharedBroker>,
    Query(SearchQuery { q, room }): Query<SearchQuery>,
) -> AppResult<Json<Value>> {
    let Some(q) = q.filter(|q| !q.trim().is_empty()) else {
        return Err(BrokerError::validation("q is required").into());
    };

    let broker = broker.lock().await;
    let messages: Vec<_> = broker
        .history
        .search(&q, room.as_deref())
        .iter()
        .map(MessageStore::format)
        .collect();
    Ok(Json(json!({ "messages": messages })))
}
