//! Direct messages between buyers and sellers

mod model;
mod service;

pub use model::*;
pub use service::{MessagingError, MessagingService};
