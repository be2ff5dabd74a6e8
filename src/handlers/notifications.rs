//! Notification inbox handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use super::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::models::ApiResponse;
use crate::notification::{ListNotificationsQuery, MarkAllReadResponse, Notification, UnreadCount};
use crate::state::AppState;

pub async fn list_notifications(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListNotificationsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Notification>>>> {
    let notifications = app_state
        .notification_service
        .list(user.user_id, query)
        .await?;
    Ok(Json(ApiResponse::ok(notifications)))
}

pub async fn unread_count(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<UnreadCount>>> {
    let unread = app_state
        .notification_service
        .unread_count(user.user_id)
        .await?;
    Ok(Json(ApiResponse::ok(UnreadCount { unread })))
}

/// Mark one of the caller's notifications read
pub async fn mark_notification_read(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Notification>>> {
    let notification = app_state
        .notification_service
        .mark_read(id, user.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Notification {} not found", id)))?;
    Ok(Json(ApiResponse::ok(notification)))
}

pub async fn mark_all_notifications_read(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<MarkAllReadResponse>>> {
    let updated = app_state
        .notification_service
        .mark_all_read(user.user_id)
        .await?;
    Ok(Json(ApiResponse::ok(MarkAllReadResponse { updated })))
}
