//! Booking domain module
//!
//! Contains the booking state machine, its errors, the service that commits
//! commands, and the expiry sweeper.

mod error;
mod expiry;
pub mod machine;
mod model;
mod service;

pub use error::BookingError;
pub use expiry::expiry_sweeper;
pub use model::*;
pub use service::{AcceptedBooking, BookingService, ReactivatedProduct};
