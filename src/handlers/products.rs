//! Product listing handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::AuthenticatedUser;
use crate::booking::ReactivatedProduct;
use crate::catalog::{CreateProductRequest, ListProductsQuery, Product};
use crate::error::{ApiError, ApiResult};
use crate::models::ApiResponse;
use crate::notification::Outcome;
use crate::state::AppState;

/// List a new product for sale
pub async fn create_product(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Product>>)> {
    request.validate()?;

    let product = app_state
        .catalog_service
        .create_product(user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(product))))
}

pub async fn list_products(
    State(app_state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Product>>>> {
    let products = app_state.catalog_service.list_products(query).await?;
    Ok(Json(ApiResponse::ok(products)))
}

pub async fn get_product(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Product>>> {
    let product = app_state
        .catalog_service
        .get_product(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {} not found", id)))?;
    Ok(Json(ApiResponse::ok(product)))
}

/// Relist a sold product (seller only)
pub async fn reactivate_product(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Outcome<ReactivatedProduct>>>> {
    let outcome = app_state
        .booking_service
        .reactivate(id, user.user_id)
        .await?;
    Ok(Json(ApiResponse::ok(outcome)))
}
