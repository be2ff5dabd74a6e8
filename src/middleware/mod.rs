//! Middleware for the marketplace API
//!
//! This module provides middleware for request tracing, rate limiting,
//! security headers, CORS, and authentication.

pub mod auth;
mod cors;
mod rate_limiter;
mod security;
mod tracing;

pub use auth::{authenticate_token, AuthError, AuthenticatedUser, OptionalUser};
pub use cors::cors_layer;
pub use rate_limiter::{client_key, rate_limit, RateLimiter};
pub use security::with_security_headers;
pub use tracing::with_request_tracing;
