//! Booking service
//!
//! Runs each command as one store call, then publishes the written rows to
//! the change feed and delivers the outbox entry. Delivery runs after
//! commit, so a delivery failure degrades the response instead of failing it.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    Booking, BookingError, BookingFilter, CreateBookingRequest, ListBookingsQuery, Transition,
};
use crate::catalog::Product;
use crate::feed::ChangeFeed;
use crate::models::Pagination;
use crate::notification::{FanoutStatus, NotificationService, Outcome};
use crate::store::{Committed, MarketplaceStore, StoreError};

/// Result of a successful accept
#[derive(Debug, Serialize, Clone)]
pub struct AcceptedBooking {
    pub booking: Booking,
    pub rejected: Vec<Booking>,
    pub product: Product,
}

/// Result of a successful reactivation
#[derive(Debug, Serialize, Clone)]
pub struct ReactivatedProduct {
    pub product: Product,
    pub released: Option<Booking>,
}

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn MarketplaceStore>,
    notifications: NotificationService,
    feed: ChangeFeed,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        notifications: NotificationService,
        feed: ChangeFeed,
    ) -> Self {
        Self {
            store,
            notifications,
            feed,
        }
    }

    /// Open a pending booking for the caller
    pub async fn request(
        &self,
        buyer_id: Uuid,
        request: CreateBookingRequest,
    ) -> Result<Outcome<Booking>, BookingError> {
        let now = Utc::now();
        let committed = self
            .store
            .request_booking(request.into_command(buyer_id, now), now)
            .await?;

        let (transition, notifications) = self.finish(committed).await;
        match transition {
            Transition::Requested { booking, .. } => {
                tracing::info!(booking_id = %booking.id, product_id = %booking.product_id, buyer_id = %buyer_id, "Booking requested");
                Ok(Outcome {
                    value: booking,
                    notifications,
                })
            }
            other => Err(unexpected(other)),
        }
    }

    /// Accept a pending booking and reject its siblings
    pub async fn accept(
        &self,
        booking_id: Uuid,
        caller_id: Uuid,
    ) -> Result<Outcome<AcceptedBooking>, BookingError> {
        let committed = self
            .store
            .accept_booking(booking_id, caller_id, Utc::now())
            .await?;

        let (transition, notifications) = self.finish(committed).await;
        match transition {
            Transition::Accepted {
                booking,
                rejected,
                product,
            } => {
                tracing::info!(
                    booking_id = %booking.id,
                    product_id = %product.id,
                    rejected = rejected.len(),
                    "Booking accepted"
                );
                Ok(Outcome {
                    value: AcceptedBooking {
                        booking,
                        rejected,
                        product,
                    },
                    notifications,
                })
            }
            other => Err(unexpected(other)),
        }
    }

    pub async fn reject(
        &self,
        booking_id: Uuid,
        caller_id: Uuid,
    ) -> Result<Outcome<Booking>, BookingError> {
        let committed = self
            .store
            .reject_booking(booking_id, caller_id, Utc::now())
            .await?;

        let (transition, notifications) = self.finish(committed).await;
        match transition {
            Transition::Rejected { booking, .. } => {
                tracing::info!(booking_id = %booking.id, "Booking rejected");
                Ok(Outcome {
                    value: booking,
                    notifications,
                })
            }
            other => Err(unexpected(other)),
        }
    }

    pub async fn cancel(
        &self,
        booking_id: Uuid,
        caller_id: Uuid,
    ) -> Result<Outcome<Booking>, BookingError> {
        let committed = self
            .store
            .cancel_booking(booking_id, caller_id, Utc::now())
            .await?;

        let (transition, notifications) = self.finish(committed).await;
        match transition {
            Transition::Cancelled { booking, .. } => {
                tracing::info!(booking_id = %booking.id, "Booking cancelled");
                Ok(Outcome {
                    value: booking,
                    notifications,
                })
            }
            other => Err(unexpected(other)),
        }
    }

    /// Put a sold product back on the market
    pub async fn reactivate(
        &self,
        product_id: Uuid,
        caller_id: Uuid,
    ) -> Result<Outcome<ReactivatedProduct>, BookingError> {
        let committed = self
            .store
            .reactivate_product(product_id, caller_id, Utc::now())
            .await?;

        let (transition, notifications) = self.finish(committed).await;
        match transition {
            Transition::Reactivated { product, released } => {
                tracing::info!(
                    product_id = %product.id,
                    released = ?released.as_ref().map(|b| b.id),
                    "Product reactivated"
                );
                Ok(Outcome {
                    value: ReactivatedProduct { product, released },
                    notifications,
                })
            }
            other => Err(unexpected(other)),
        }
    }

    /// Fetch a booking visible to the caller
    pub async fn get(&self, booking_id: Uuid, caller_id: Uuid) -> Result<Booking, BookingError> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound("Booking"))?;

        if !booking.involves(caller_id) {
            return Err(BookingError::NotAuthorized("view this booking"));
        }
        Ok(booking)
    }

    pub async fn list(
        &self,
        caller_id: Uuid,
        query: ListBookingsQuery,
    ) -> Result<Vec<Booking>, BookingError> {
        let page = Pagination::new(query.page, query.limit);
        let filter = BookingFilter {
            user_id: caller_id,
            role: query.role.unwrap_or_default(),
            status: query.status,
            product_id: query.product_id,
            limit: page.limit,
            offset: page.offset,
        };
        Ok(self.store.list_bookings(&filter).await?)
    }

    /// Cancel up to `limit` overdue pending bookings and notify their buyers
    pub async fn sweep_expired(&self, limit: i64) -> Result<usize, StoreError> {
        let expired = self.store.expire_pending_bookings(Utc::now(), limit).await?;
        let count = expired.len();

        for committed in expired {
            self.finish(committed).await;
        }
        Ok(count)
    }

    async fn finish(&self, committed: Committed<Transition>) -> (Transition, FanoutStatus) {
        let Committed { value, outbox_id } = committed;
        self.feed.publish_transition(&value);

        let status = self.notifications.deliver(outbox_id).await;
        if let FanoutStatus::Deferred { reason } = &status {
            tracing::warn!(
                transition = value.name(),
                product_id = %value.product().id,
                reason = %reason,
                "Transition committed with deferred notifications"
            );
        }
        (value, status)
    }
}

fn unexpected(transition: Transition) -> BookingError {
    BookingError::InvalidTransition(format!(
        "store returned an unexpected '{}' transition",
        transition.name()
    ))
}
