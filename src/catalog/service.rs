//! Catalog service: listings and profiles

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    CreateProductRequest, ListProductsQuery, NewProduct, Product, Profile, UpsertProfileRequest,
};
use crate::feed::{ChangeEvent, ChangeFeed, ChangeOp};
use crate::models::Pagination;
use crate::store::{MarketplaceStore, ProductFilter, StoreError};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn MarketplaceStore>,
    feed: ChangeFeed,
}

impl CatalogService {
    pub fn new(store: Arc<dyn MarketplaceStore>, feed: ChangeFeed) -> Self {
        Self { store, feed }
    }

    pub async fn create_product(
        &self,
        seller_id: Uuid,
        request: CreateProductRequest,
    ) -> Result<Product, StoreError> {
        let product = self
            .store
            .insert_product(
                NewProduct {
                    seller_id,
                    title: request.title,
                    price: request.price,
                },
                Utc::now(),
            )
            .await?;

        tracing::info!(product_id = %product.id, seller_id = %seller_id, "Product listed");
        self.feed.publish(ChangeEvent::product(ChangeOp::Insert, &product));
        Ok(product)
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        self.store.get_product(id).await
    }

    pub async fn list_products(
        &self,
        query: ListProductsQuery,
    ) -> Result<Vec<Product>, StoreError> {
        self.store
            .list_products(&ProductFilter {
                status: query.status,
                seller_id: query.seller_id,
                page: Pagination::new(query.page, query.limit),
            })
            .await
    }

    pub async fn upsert_profile(
        &self,
        user_id: Uuid,
        request: UpsertProfileRequest,
    ) -> Result<Profile, StoreError> {
        let profile = self.store.upsert_profile(user_id, request, Utc::now()).await?;
        tracing::debug!(user_id = %user_id, "Profile saved");
        Ok(profile)
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError> {
        self.store.get_profile(user_id).await
    }
}
