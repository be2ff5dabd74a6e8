//! Authentication module
//!
//! Identity comes from an external auth provider that signs HS256 bearer
//! tokens with a shared secret.
//! - JWT token validation
//! - JWT token generation for local development and tests

mod jwt;
mod service;

pub use jwt::{generate_access_token, verify_token, Claims, JwtError};
pub use service::AuthService;
