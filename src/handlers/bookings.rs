//! Booking lifecycle handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::AuthenticatedUser;
use crate::booking::{AcceptedBooking, Booking, CreateBookingRequest, ListBookingsQuery};
use crate::error::ApiResult;
use crate::models::ApiResponse;
use crate::notification::Outcome;
use crate::state::AppState;

/// Request to buy a product
pub async fn create_booking(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateBookingRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Outcome<Booking>>>)> {
    request.validate()?;

    let outcome = app_state
        .booking_service
        .request(user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(outcome))))
}

/// The caller's bookings, as buyer (default) or as seller
pub async fn list_bookings(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListBookingsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Booking>>>> {
    let bookings = app_state
        .booking_service
        .list(user.user_id, query)
        .await?;
    Ok(Json(ApiResponse::ok(bookings)))
}

pub async fn get_booking(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Booking>>> {
    let booking = app_state.booking_service.get(id, user.user_id).await?;
    Ok(Json(ApiResponse::ok(booking)))
}

pub async fn accept_booking(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Outcome<AcceptedBooking>>>> {
    let outcome = app_state.booking_service.accept(id, user.user_id).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

pub async fn reject_booking(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Outcome<Booking>>>> {
    let outcome = app_state.booking_service.reject(id, user.user_id).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

pub async fn cancel_booking(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Outcome<Booking>>>> {
    let outcome = app_state.booking_service.cancel(id, user.user_id).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}
