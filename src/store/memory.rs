//! In-process store backend
//!
//! Holds every table behind one async mutex, so each trait call is a
//! critical section. Used for local development (`STORE_BACKEND=memory`) and
//! by the test suite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Committed, MarketplaceStore, ProductFilter, StoreError};
use crate::booking::{
    machine, Booking, BookingError, BookingFilter, BookingRole, BookingStatus, RequestBooking,
    Transition,
};
use crate::catalog::{NewProduct, Product, ProductStatus, Profile, UpsertProfileRequest};
use crate::messaging::{Message, NewMessage};
use crate::notification::{fanout, Notification, NotificationDraft, NotificationFilter};

#[derive(Debug, Clone)]
struct OutboxRow {
    id: Uuid,
    drafts: Vec<NotificationDraft>,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Tables {
    profiles: HashMap<Uuid, Profile>,
    products: HashMap<Uuid, Product>,
    bookings: HashMap<Uuid, Booking>,
    messages: Vec<Message>,
    notifications: Vec<Notification>,
    outbox: Vec<OutboxRow>,
}

impl Tables {
    /// Bookings of one product in creation order
    fn product_bookings(&self, product_id: Uuid) -> Vec<Booking> {
        let mut rows: Vec<Booking> = self
            .bookings
            .values()
            .filter(|b| b.product_id == product_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        rows
    }

    fn product(&self, id: Uuid) -> Result<Product, BookingError> {
        self.products
            .get(&id)
            .cloned()
            .ok_or(BookingError::NotFound("Product"))
    }

    fn booking(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.bookings
            .get(&id)
            .cloned()
            .ok_or(BookingError::NotFound("Booking"))
    }

    fn set_booking_status(
        &mut self,
        id: Uuid,
        status: BookingStatus,
        now: DateTime<Utc>,
    ) -> Option<Booking> {
        let row = self.bookings.get_mut(&id)?;
        row.status = status;
        row.updated_at = now;
        Some(row.clone())
    }

    fn set_product_status(
        &mut self,
        id: Uuid,
        status: ProductStatus,
        now: DateTime<Utc>,
    ) -> Option<Product> {
        let row = self.products.get_mut(&id)?;
        row.status = status;
        row.updated_at = now;
        Some(row.clone())
    }

    fn enqueue(&mut self, drafts: Vec<NotificationDraft>, now: DateTime<Utc>) -> Option<Uuid> {
        if drafts.is_empty() {
            return None;
        }
        let id = Uuid::new_v4();
        self.outbox.push(OutboxRow {
            id,
            drafts,
            attempts: 0,
            last_error: None,
            created_at: now,
            delivered_at: None,
        });
        Some(id)
    }

    fn commit(
        &mut self,
        transition: Transition,
        actor_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Committed<Transition> {
        let drafts = fanout::drafts_for_transition(&transition, actor_id);
        let outbox_id = self.enqueue(drafts, now);
        Committed {
            value: transition,
            outbox_id,
        }
    }
}

/// Memory-backed [`MarketplaceStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_deliveries: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make [`MarketplaceStore::deliver_outbox`] fail until switched off,
    /// simulating a notification write outage.
    pub fn set_delivery_failure(&self, fail: bool) {
        self.fail_deliveries.store(fail, Ordering::SeqCst);
    }

    /// Every booking of a product, for invariant checks in tests
    pub async fn bookings_for_product(&self, product_id: Uuid) -> Vec<Booking> {
        self.tables.lock().await.product_bookings(product_id)
    }

    /// Every notification addressed to a user, oldest first
    pub async fn notifications_for(&self, recipient_id: Uuid) -> Vec<Notification> {
        let tables = self.tables.lock().await;
        tables
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect()
    }

    pub async fn notification_total(&self) -> usize {
        self.tables.lock().await.notifications.len()
    }

    /// Delivery attempts and last recorded failure of an outbox entry
    pub async fn outbox_attempts(&self, outbox_id: Uuid) -> Option<(i32, Option<String>)> {
        let tables = self.tables.lock().await;
        tables
            .outbox
            .iter()
            .find(|row| row.id == outbox_id)
            .map(|row| (row.attempts, row.last_error.clone()))
    }
}

fn page<T: Clone>(rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl MarketplaceStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        profile: UpsertProfileRequest,
        now: DateTime<Utc>,
    ) -> Result<Profile, StoreError> {
        let mut tables = self.tables.lock().await;

        let taken = tables
            .profiles
            .values()
            .any(|p| p.id != user_id && p.username == profile.username);
        if taken {
            return Err(StoreError::Conflict(format!(
                "username '{}' is taken",
                profile.username
            )));
        }

        let created_at = tables.profiles.get(&user_id).map(|p| p.created_at).unwrap_or(now);
        let row = Profile {
            id: user_id,
            username: profile.username,
            full_name: profile.full_name,
            phone: profile.phone,
            created_at,
            updated_at: now,
        };
        tables.profiles.insert(user_id, row.clone());
        Ok(row)
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError> {
        Ok(self.tables.lock().await.profiles.get(&user_id).cloned())
    }

    async fn insert_product(
        &self,
        product: NewProduct,
        now: DateTime<Utc>,
    ) -> Result<Product, StoreError> {
        let row = Product {
            id: Uuid::new_v4(),
            seller_id: product.seller_id,
            title: product.title,
            price: product.price,
            status: ProductStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.products.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.tables.lock().await.products.get(&id).cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Product> = tables
            .products
            .values()
            .filter(|p| filter.status.map(|s| p.status == s).unwrap_or(true))
            .filter(|p| filter.seller_id.map(|s| p.seller_id == s).unwrap_or(true))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, filter.page.limit, filter.page.offset))
    }

    async fn request_booking(
        &self,
        cmd: RequestBooking,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError> {
        let mut tables = self.tables.lock().await;

        let product = tables.product(cmd.product_id)?;
        let existing = tables.product_bookings(product.id);
        let plan = machine::plan_request(&cmd, &product, &existing, now)?;

        let superseded = plan
            .supersede
            .and_then(|stale| tables.set_booking_status(stale, BookingStatus::Cancelled, now));

        let booking = machine::new_booking(&cmd, &product, now);
        tables.bookings.insert(booking.id, booking.clone());

        Ok(tables.commit(
            Transition::Requested {
                booking,
                superseded,
                product,
            },
            Some(cmd.buyer_id),
            now,
        ))
    }

    async fn accept_booking(
        &self,
        booking_id: Uuid,
        caller_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError> {
        let mut tables = self.tables.lock().await;

        let target = tables.booking(booking_id)?;
        let product = tables.product(target.product_id)?;
        let siblings = tables.product_bookings(product.id);
        let plan = machine::plan_accept(caller_id, booking_id, &product, &siblings, now)?;

        let booking = tables
            .set_booking_status(plan.accept, BookingStatus::Accepted, now)
            .ok_or(BookingError::NotFound("Booking"))?;
        let rejected: Vec<Booking> = plan
            .reject
            .iter()
            .filter_map(|id| tables.set_booking_status(*id, BookingStatus::Rejected, now))
            .collect();
        let product = tables
            .set_product_status(product.id, ProductStatus::Sold, now)
            .ok_or(BookingError::NotFound("Product"))?;

        Ok(tables.commit(
            Transition::Accepted {
                booking,
                rejected,
                product,
            },
            Some(caller_id),
            now,
        ))
    }

    async fn reject_booking(
        &self,
        booking_id: Uuid,
        caller_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError> {
        let mut tables = self.tables.lock().await;

        let target = tables.booking(booking_id)?;
        machine::check_reject(caller_id, &target)?;
        let product = tables.product(target.product_id)?;
        let booking = tables
            .set_booking_status(booking_id, BookingStatus::Rejected, now)
            .ok_or(BookingError::NotFound("Booking"))?;

        Ok(tables.commit(
            Transition::Rejected { booking, product },
            Some(caller_id),
            now,
        ))
    }

    async fn cancel_booking(
        &self,
        booking_id: Uuid,
        caller_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError> {
        let mut tables = self.tables.lock().await;

        let target = tables.booking(booking_id)?;
        machine::check_cancel(caller_id, &target)?;
        let product = tables.product(target.product_id)?;
        let booking = tables
            .set_booking_status(booking_id, BookingStatus::Cancelled, now)
            .ok_or(BookingError::NotFound("Booking"))?;

        Ok(tables.commit(
            Transition::Cancelled { booking, product },
            Some(caller_id),
            now,
        ))
    }

    async fn reactivate_product(
        &self,
        product_id: Uuid,
        caller_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError> {
        let mut tables = self.tables.lock().await;

        let product = tables.product(product_id)?;
        let bookings = tables.product_bookings(product_id);
        let plan = machine::plan_reactivate(caller_id, &product, &bookings)?;

        let released = plan
            .release
            .and_then(|id| tables.set_booking_status(id, BookingStatus::Cancelled, now));
        let product = tables
            .set_product_status(product_id, ProductStatus::Active, now)
            .ok_or(BookingError::NotFound("Product"))?;

        Ok(tables.commit(
            Transition::Reactivated { product, released },
            Some(caller_id),
            now,
        ))
    }

    async fn expire_pending_bookings(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Committed<Transition>>, StoreError> {
        let mut tables = self.tables.lock().await;

        let all: Vec<Booking> = tables.bookings.values().cloned().collect();
        let mut due: Vec<&Booking> = machine::expired(&all, now);
        due.sort_by_key(|b| b.expires_at);
        due.truncate(limit.max(0) as usize);

        let mut committed = Vec::with_capacity(due.len());
        for stale in due {
            let Some(product) = tables.products.get(&stale.product_id).cloned() else {
                continue;
            };
            if let Some(booking) =
                tables.set_booking_status(stale.id, BookingStatus::Cancelled, now)
            {
                committed.push(tables.commit(Transition::Expired { booking, product }, None, now));
            }
        }
        Ok(committed)
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.tables.lock().await.bookings.get(&id).cloned())
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| match filter.role {
                BookingRole::Buyer => b.buyer_id == filter.user_id,
                BookingRole::Seller => b.seller_id == filter.user_id,
            })
            .filter(|b| filter.status.map(|s| b.status == s).unwrap_or(true))
            .filter(|b| filter.product_id.map(|p| b.product_id == p).unwrap_or(true))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, filter.limit, filter.offset))
    }

    async fn insert_message(
        &self,
        message: NewMessage,
        now: DateTime<Utc>,
    ) -> Result<Committed<Message>, StoreError> {
        let mut tables = self.tables.lock().await;

        let row = Message {
            id: Uuid::new_v4(),
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            product_id: message.product_id,
            body: message.body,
            created_at: now,
        };
        tables.messages.push(row.clone());
        let outbox_id = tables.enqueue(fanout::drafts_for_message(&row), now);

        Ok(Committed {
            value: row,
            outbox_id,
        })
    }

    async fn list_conversation(
        &self,
        user_id: Uuid,
        other_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == user_id && m.recipient_id == other_id)
                    || (m.sender_id == other_id && m.recipient_id == user_id)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, limit, 0))
    }

    async fn deliver_outbox(
        &self,
        outbox_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, StoreError> {
        let mut tables = self.tables.lock().await;

        let Some(index) = tables.outbox.iter().position(|row| row.id == outbox_id) else {
            return Ok(Vec::new());
        };
        if tables.outbox[index].delivered_at.is_some() {
            return Ok(Vec::new());
        }
        if self.fail_deliveries.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "notification writes are failing".to_string(),
            ));
        }

        let drafts = tables.outbox[index].drafts.clone();
        let delivered: Vec<Notification> = drafts
            .into_iter()
            .filter(|draft| {
                !tables
                    .notifications
                    .iter()
                    .any(|n| n.outbox_id == Some(outbox_id) && n.recipient_id == draft.recipient_id)
            })
            .map(|draft| draft.into_notification(outbox_id, now))
            .collect();

        tables.notifications.extend(delivered.iter().cloned());
        let row = &mut tables.outbox[index];
        row.delivered_at = Some(now);
        row.attempts += 1;
        Ok(delivered)
    }

    async fn record_outbox_failure(&self, outbox_id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(row) = tables.outbox.iter_mut().find(|row| row.id == outbox_id) {
            row.attempts += 1;
            row.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn undelivered_outbox(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<&OutboxRow> = tables
            .outbox
            .iter()
            .filter(|row| row.delivered_at.is_none() && row.created_at <= older_than)
            .collect();
        rows.sort_by_key(|row| row.created_at);
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|row| row.id)
            .collect())
    }

    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|n| n.recipient_id == filter.recipient_id)
            .filter(|n| !filter.unread_only || !n.read)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, filter.limit, filter.offset))
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
    ) -> Result<Option<Notification>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.recipient_id == recipient_id)
            .map(|n| {
                n.read = true;
                n.clone()
            }))
    }

    async fn mark_all_notifications_read(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<Notification>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .notifications
            .iter_mut()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
            .map(|n| {
                n.read = true;
                n.clone()
            })
            .collect())
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
            .count() as i64)
    }
}
