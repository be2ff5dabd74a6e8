use axum::{routing::post, Router};

use crate::handlers::*;
use crate::state::AppState;

pub fn message_routes() -> Router<AppState> {
    Router::new().route("/api/messages", post(send_message).get(list_messages))
}
