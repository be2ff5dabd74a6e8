//! Notification domain module
//!
//! Fanout rules, the delivery service and the outbox retry worker.

pub mod fanout;
mod model;
mod service;

pub use model::*;
pub use service::{outbox_retry_worker, NotificationService};
