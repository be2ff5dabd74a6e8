//! Booking state machine
//!
//! Pure transition rules shared by every store backend. A store loads the
//! product row and all of its bookings inside its critical section, asks this
//! module for a plan, and applies the plan before releasing the lock.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Booking, BookingError, BookingStatus, RequestBooking};
use crate::catalog::{Product, ProductStatus};

/// Outcome of validating a booking request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPlan {
    /// The buyer's own lapsed pending booking, cancelled to make room
    pub supersede: Option<Uuid>,
}

/// Rows to write when a booking is accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptPlan {
    pub accept: Uuid,
    pub reject: Vec<Uuid>,
}

/// Rows to write when a sold product is relisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactivatePlan {
    pub release: Option<Uuid>,
}

pub fn plan_request(
    cmd: &RequestBooking,
    product: &Product,
    bookings: &[Booking],
    now: DateTime<Utc>,
) -> Result<RequestPlan, BookingError> {
    if cmd.buyer_id == product.seller_id {
        return Err(BookingError::SelfBookingForbidden);
    }

    if cmd.expires_at.map(|at| at <= now).unwrap_or(false) {
        return Err(BookingError::BookingExpired);
    }

    let mut supersede = None;
    for existing in bookings
        .iter()
        .filter(|b| b.product_id == product.id && b.buyer_id == cmd.buyer_id && b.is_active())
    {
        if existing.is_expired(now) {
            supersede = Some(existing.id);
        } else {
            return Err(BookingError::AlreadyBooked);
        }
    }

    let committed = bookings
        .iter()
        .any(|b| b.product_id == product.id && b.status == BookingStatus::Accepted);
    if committed || product.status != ProductStatus::Active {
        return Err(BookingError::ProductUnavailable);
    }

    Ok(RequestPlan { supersede })
}

/// Build the pending row for an accepted request
pub fn new_booking(cmd: &RequestBooking, product: &Product, now: DateTime<Utc>) -> Booking {
    Booking {
        id: Uuid::new_v4(),
        product_id: product.id,
        buyer_id: cmd.buyer_id,
        seller_id: product.seller_id,
        offered_price: cmd.offered_price,
        message: cmd.message.clone(),
        preferred_date: cmd.preferred_date,
        expires_at: cmd.expires_at,
        status: BookingStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}

pub fn plan_accept(
    caller_id: Uuid,
    booking_id: Uuid,
    product: &Product,
    bookings: &[Booking],
    now: DateTime<Utc>,
) -> Result<AcceptPlan, BookingError> {
    let target = bookings
        .iter()
        .find(|b| b.id == booking_id)
        .ok_or(BookingError::NotFound("Booking"))?;

    if caller_id != target.seller_id || caller_id != product.seller_id {
        return Err(BookingError::NotAuthorized("accept this booking"));
    }
    ensure_pending(target, "accept")?;
    if target.is_expired(now) {
        return Err(BookingError::BookingExpired);
    }

    let other_accepted = bookings
        .iter()
        .any(|b| b.id != target.id && b.status == BookingStatus::Accepted);
    if other_accepted || product.status != ProductStatus::Active {
        return Err(BookingError::AlreadyAccepted);
    }

    let reject = bookings
        .iter()
        .filter(|b| b.id != target.id && b.status == BookingStatus::Pending)
        .map(|b| b.id)
        .collect();

    Ok(AcceptPlan {
        accept: target.id,
        reject,
    })
}

pub fn check_reject(caller_id: Uuid, booking: &Booking) -> Result<(), BookingError> {
    if caller_id != booking.seller_id {
        return Err(BookingError::NotAuthorized("reject this booking"));
    }
    ensure_pending(booking, "reject")
}

pub fn check_cancel(caller_id: Uuid, booking: &Booking) -> Result<(), BookingError> {
    if caller_id != booking.buyer_id {
        return Err(BookingError::NotAuthorized("cancel this booking"));
    }
    ensure_pending(booking, "cancel")
}

pub fn plan_reactivate(
    caller_id: Uuid,
    product: &Product,
    bookings: &[Booking],
) -> Result<ReactivatePlan, BookingError> {
    if caller_id != product.seller_id {
        return Err(BookingError::NotAuthorized("reactivate this product"));
    }
    if product.status != ProductStatus::Sold {
        return Err(BookingError::InvalidTransition(format!(
            "cannot reactivate a product that is {}",
            product.status.as_str()
        )));
    }

    let release = bookings
        .iter()
        .find(|b| b.status == BookingStatus::Accepted)
        .map(|b| b.id);

    Ok(ReactivatePlan { release })
}

/// Pending bookings past their expiry
pub fn expired<'a>(bookings: &'a [Booking], now: DateTime<Utc>) -> Vec<&'a Booking> {
    bookings.iter().filter(|b| b.is_expired(now)).collect()
}

fn ensure_pending(booking: &Booking, action: &str) -> Result<(), BookingError> {
    if booking.status != BookingStatus::Pending {
        return Err(BookingError::InvalidTransition(format!(
            "cannot {} a booking that is {}",
            action, booking.status
        )));
    }
    Ok(())
}
