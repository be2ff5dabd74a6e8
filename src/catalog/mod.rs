//! Product listings and user profiles

mod model;
mod service;

pub use model::*;
pub use service::CatalogService;
