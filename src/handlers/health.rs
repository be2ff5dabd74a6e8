use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub backend: String,
    pub feed_subscribers: usize,
    pub version: String,
}

pub async fn root() -> &'static str {
    "Marketplace API Server"
}

/// Health check endpoint
pub async fn health_check(State(app_state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, store) = match app_state.store.ping().await {
        Ok(()) => (StatusCode::OK, "connected".to_string()),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, format!("error: {}", e)),
    };

    let body = HealthResponse {
        status: if status == StatusCode::OK { "healthy" } else { "unhealthy" }.to_string(),
        store,
        backend: app_state.store.backend_name().to_string(),
        feed_subscribers: app_state.feed.subscriber_count(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (status, Json(body))
}
