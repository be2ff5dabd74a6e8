//! Product route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", post(create_product).get(list_products))
        .route("/api/products/:id", get(get_product))
        .route("/api/products/:id/reactivate", post(reactivate_product))
}
