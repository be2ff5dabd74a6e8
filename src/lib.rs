//! Marketplace Backend Library
//!
//! Booking coordination, notification fanout and the realtime change feed
//! for a consumer-to-consumer marketplace.

pub mod auth;
pub mod booking;
pub mod catalog;
pub mod config;
pub mod error;
pub mod feed;
pub mod handlers;
pub mod messaging;
pub mod middleware;
pub mod models;
pub mod notification;
pub mod routes;
pub mod state;
pub mod store;
pub mod websocket;

use axum::{routing::get, Router};

use config::Config;
use middleware::RateLimiter;
use state::AppState;

/// Assemble the full HTTP router with its middleware stack
pub fn build_router(app_state: AppState, config: &Config, rate_limiter: RateLimiter) -> Router {
    let router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/ws", get(websocket::ws_handler))
        .merge(routes::product_routes())
        .merge(routes::booking_routes())
        .merge(routes::notification_routes())
        .merge(routes::message_routes())
        .merge(routes::profile_routes())
        .with_state(app_state)
        .layer(axum::middleware::from_fn_with_state(
            rate_limiter,
            middleware::rate_limit,
        ));

    let router = middleware::with_security_headers(router, config.environment.is_production());
    middleware::with_request_tracing(router)
        .layer(middleware::cors_layer(config.cors_allowed_origins.as_deref()))
}
