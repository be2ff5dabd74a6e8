//! API handlers for the marketplace backend

mod bookings;
mod health;
mod messages;
mod notifications;
mod products;
mod profiles;

pub use bookings::*;
pub use health::*;
pub use messages::*;
pub use notifications::*;
pub use products::*;
pub use profiles::*;

// Re-export AuthenticatedUser from middleware for handler use
pub use crate::middleware::auth::AuthenticatedUser;
