//! Booking models and data structures

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::catalog::Product;

/// Buyer's request to purchase a product
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: Uuid,
    pub product_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub offered_price: Option<i64>,
    pub message: Option<String>,
    pub preferred_date: Option<NaiveDate>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Pending or accepted
    pub fn is_active(&self) -> bool {
        matches!(self.status, BookingStatus::Pending | BookingStatus::Accepted)
    }

    /// A pending booking whose expiry has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending
            && self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}

/// Booking lifecycle status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
        }
    }

}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command issued by a buyer to open a booking
#[derive(Debug, Clone)]
pub struct RequestBooking {
    pub product_id: Uuid,
    pub buyer_id: Uuid,
    pub offered_price: Option<i64>,
    pub message: Option<String>,
    pub preferred_date: Option<NaiveDate>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request DTO for creating a booking
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub product_id: Uuid,
    #[validate(range(min = 0))]
    pub offered_price: Option<i64>,
    #[validate(length(max = 1000))]
    pub message: Option<String>,
    pub preferred_date: Option<NaiveDate>,
    /// Hours from now until the request lapses
    #[validate(range(min = 1, max = 720))]
    pub expires_in_hours: Option<i64>,
}

impl CreateBookingRequest {
    pub fn into_command(self, buyer_id: Uuid, now: DateTime<Utc>) -> RequestBooking {
        RequestBooking {
            product_id: self.product_id,
            buyer_id,
            offered_price: self.offered_price,
            message: self.message,
            preferred_date: self.preferred_date,
            expires_at: self
                .expires_in_hours
                .map(|hours| now + chrono::Duration::hours(hours)),
        }
    }
}

/// Which side of the booking the caller is listing
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookingRole {
    #[default]
    Buyer,
    Seller,
}

/// Query parameters for listing bookings
#[derive(Debug, Default, Deserialize)]
pub struct ListBookingsQuery {
    pub role: Option<BookingRole>,
    pub status: Option<BookingStatus>,
    pub product_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Store-level booking filter
#[derive(Debug, Clone)]
pub struct BookingFilter {
    pub user_id: Uuid,
    pub role: BookingRole,
    pub status: Option<BookingStatus>,
    pub product_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

/// State change produced by one committed command
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Requested {
        booking: Booking,
        /// The buyer's own lapsed booking cancelled to make room
        superseded: Option<Booking>,
        product: Product,
    },
    Accepted {
        booking: Booking,
        rejected: Vec<Booking>,
        product: Product,
    },
    Rejected {
        booking: Booking,
        product: Product,
    },
    Cancelled {
        booking: Booking,
        product: Product,
    },
    Expired {
        booking: Booking,
        product: Product,
    },
    Reactivated {
        product: Product,
        released: Option<Booking>,
    },
}

impl Transition {
    pub fn product(&self) -> &Product {
        match self {
            Transition::Requested { product, .. }
            | Transition::Accepted { product, .. }
            | Transition::Rejected { product, .. }
            | Transition::Cancelled { product, .. }
            | Transition::Expired { product, .. }
            | Transition::Reactivated { product, .. } => product,
        }
    }

    /// Every booking row the transition wrote
    pub fn bookings(&self) -> Vec<&Booking> {
        match self {
            Transition::Requested {
                booking, superseded, ..
            } => superseded.iter().chain(std::iter::once(booking)).collect(),
            Transition::Rejected { booking, .. }
            | Transition::Cancelled { booking, .. }
            | Transition::Expired { booking, .. } => vec![booking],
            Transition::Accepted {
                booking, rejected, ..
            } => std::iter::once(booking).chain(rejected.iter()).collect(),
            Transition::Reactivated { released, .. } => released.iter().collect(),
        }
    }

    /// Whether the product row changed
    pub fn touches_product(&self) -> bool {
        matches!(
            self,
            Transition::Accepted { .. } | Transition::Reactivated { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transition::Requested { .. } => "requested",
            Transition::Accepted { .. } => "accepted",
            Transition::Rejected { .. } => "rejected",
            Transition::Cancelled { .. } => "cancelled",
            Transition::Expired { .. } => "expired",
            Transition::Reactivated { .. } => "reactivated",
        }
    }
}
