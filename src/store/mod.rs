//! Persistence store
//!
//! Every booking command is a single store call so that the backend can run
//! the availability checks and the resulting writes inside one critical
//! section. The PostgreSQL backend uses a transaction holding the product row
//! lock; the memory backend holds one mutex across the whole command.
//!
//! Commands that owe notifications also write an outbox entry inside the same
//! critical section. Delivering the entry is a separate call, see
//! [`MarketplaceStore::deliver_outbox`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::booking::{Booking, BookingError, BookingFilter, RequestBooking, Transition};
use crate::catalog::{NewProduct, Product, Profile, UpsertProfileRequest};
use crate::messaging::{Message, NewMessage};
use crate::models::Pagination;
use crate::notification::{Notification, NotificationFilter};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Infrastructure errors raised by a store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A committed write plus the outbox entry it produced, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<T> {
    pub value: T,
    pub outbox_id: Option<Uuid>,
}

/// Catalog filter used when browsing listings
#[derive(Debug, Clone)]
pub struct ProductFilter {
    pub status: Option<crate::catalog::ProductStatus>,
    pub seller_id: Option<Uuid>,
    pub page: Pagination,
}

#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    /// Connectivity check for health probes
    async fn ping(&self) -> Result<(), StoreError>;

    fn backend_name(&self) -> &'static str;

    // ===== Profiles =====

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        profile: UpsertProfileRequest,
        now: DateTime<Utc>,
    ) -> Result<Profile, StoreError>;

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError>;

    // ===== Catalog =====

    async fn insert_product(
        &self,
        product: NewProduct,
        now: DateTime<Utc>,
    ) -> Result<Product, StoreError>;

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;

    // ===== Booking lifecycle =====

    async fn request_booking(
        &self,
        cmd: RequestBooking,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError>;

    async fn accept_booking(
        &self,
        booking_id: Uuid,
        caller_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError>;

    async fn reject_booking(
        &self,
        booking_id: Uuid,
        caller_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError>;

    async fn cancel_booking(
        &self,
        booking_id: Uuid,
        caller_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError>;

    async fn reactivate_product(
        &self,
        product_id: Uuid,
        caller_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError>;

    /// Cancel up to `limit` pending bookings whose expiry is at or before `now`
    async fn expire_pending_bookings(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Committed<Transition>>, StoreError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError>;

    // ===== Messaging =====

    async fn insert_message(
        &self,
        message: NewMessage,
        now: DateTime<Utc>,
    ) -> Result<Committed<Message>, StoreError>;

    async fn list_conversation(
        &self,
        user_id: Uuid,
        other_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError>;

    // ===== Notifications =====

    /// Turn an outbox entry into notification rows.
    ///
    /// All drafts of the entry are inserted together and the entry is marked
    /// delivered in the same critical section. Returns an empty list when the
    /// entry was already delivered.
    async fn deliver_outbox(
        &self,
        outbox_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn record_outbox_failure(&self, outbox_id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Undelivered outbox ids created at or before `older_than`, oldest first
    async fn undelivered_outbox(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError>;

    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>, StoreError>;

    /// Flip `read` for one of the recipient's notifications.
    ///
    /// Returns `None` when no notification with that id belongs to the
    /// recipient. Already-read rows are returned unchanged.
    async fn mark_notification_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
    ) -> Result<Option<Notification>, StoreError>;

    /// Returns the rows that flipped
    async fn mark_all_notifications_read(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64, StoreError>;
}
