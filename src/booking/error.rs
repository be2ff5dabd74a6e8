//! Booking command errors

use thiserror::Error;

use crate::store::StoreError;

const ONE_ACCEPTED_CONSTRAINT: &str = "bookings_one_accepted_per_product";
const ONE_ACTIVE_CONSTRAINT: &str = "bookings_one_active_per_buyer";

/// Errors returned by booking lifecycle commands
#[derive(Error, Debug)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Caller is not permitted to {0}")]
    NotAuthorized(&'static str),

    #[error("Sellers cannot book their own products")]
    SelfBookingForbidden,

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Another booking on this product has already been accepted")]
    AlreadyAccepted,

    #[error("You already have an active booking on this product")]
    AlreadyBooked,

    #[error("Product is no longer available")]
    ProductUnavailable,

    #[error("Booking request has expired")]
    BookingExpired,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::NotAuthorized(_) => "NOT_AUTHORIZED",
            BookingError::SelfBookingForbidden => "SELF_BOOKING_FORBIDDEN",
            BookingError::InvalidTransition(_) => "INVALID_TRANSITION",
            BookingError::AlreadyAccepted => "ALREADY_ACCEPTED",
            BookingError::AlreadyBooked => "ALREADY_BOOKED",
            BookingError::ProductUnavailable => "PRODUCT_UNAVAILABLE",
            BookingError::BookingExpired => "BOOKING_EXPIRED",
            BookingError::Store(_) => "STORE_ERROR",
        }
    }

    /// Authorization and state errors must not be retried automatically
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::Store(_))
    }
}

impl From<sqlx::Error> for BookingError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.constraint() {
                Some(ONE_ACCEPTED_CONSTRAINT) => return BookingError::AlreadyAccepted,
                Some(ONE_ACTIVE_CONSTRAINT) => return BookingError::AlreadyBooked,
                _ => {}
            }
        }
        BookingError::Store(StoreError::from(err))
    }
}

impl From<serde_json::Error> for BookingError {
    fn from(err: serde_json::Error) -> Self {
        BookingError::Store(StoreError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_errors_are_retryable() {
        assert!(!BookingError::AlreadyAccepted.is_retryable());
        assert!(!BookingError::NotAuthorized("accept this booking").is_retryable());
        assert!(BookingError::Store(StoreError::Unavailable("down".into())).is_retryable());
    }

    #[test]
    fn test_row_not_found_is_a_store_error() {
        let err = BookingError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.code(), "STORE_ERROR");
    }
}
