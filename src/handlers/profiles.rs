use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::AuthenticatedUser;
use crate::catalog::{Profile, UpsertProfileRequest};
use crate::error::{ApiError, ApiResult};
use crate::models::ApiResponse;
use crate::state::AppState;

/// Create or update the caller's profile
pub async fn upsert_my_profile(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<UpsertProfileRequest>,
) -> ApiResult<Json<ApiResponse<Profile>>> {
    request.validate()?;

    let profile = app_state
        .catalog_service
        .upsert_profile(user.user_id, request)
        .await?;
    Ok(Json(ApiResponse::ok(profile)))
}

pub async fn get_profile(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Profile>>> {
    let profile = app_state
        .catalog_service
        .get_profile(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Profile {} not found", id)))?;
    Ok(Json(ApiResponse::ok(profile)))
}
