//! Route definitions for the marketplace API

mod bookings;
mod messages;
mod notifications;
mod products;
mod profiles;

pub use bookings::booking_routes;
pub use messages::message_routes;
pub use notifications::notification_routes;
pub use products::product_routes;
pub use profiles::profile_routes;
