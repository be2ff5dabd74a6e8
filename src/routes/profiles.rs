use axum::{
    routing::{get, put},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/api/profiles/me", put(upsert_my_profile))
        .route("/api/profiles/:id", get(get_profile))
}
