//! Product and profile models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

/// Listed product
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub title: String,
    pub price: i64,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product availability
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "product_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Sold,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Sold => "sold",
        }
    }
}

/// Insert shape for a new listing
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub seller_id: Uuid,
    pub title: String,
    pub price: i64,
}

/// Request DTO for listing a product
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(range(min = 0))]
    pub price: i64,
}

/// Query parameters for browsing products
#[derive(Debug, Default, Deserialize)]
pub struct ListProductsQuery {
    pub status: Option<ProductStatus>,
    pub seller_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// User identity and contact details
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request DTO for creating or updating the caller's profile
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertProfileRequest {
    #[validate(length(min = 3, max = 32))]
    pub username: String,
    #[validate(length(max = 120))]
    pub full_name: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
}
