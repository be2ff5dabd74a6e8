//! Booking route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/api/bookings", post(create_booking).get(list_bookings))
        .route("/api/bookings/:id", get(get_booking))
        .route("/api/bookings/:id/accept", post(accept_booking))
        .route("/api/bookings/:id/reject", post(reject_booking))
        .route("/api/bookings/:id/cancel", post(cancel_booking))
}
