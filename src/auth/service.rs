//! Authentication service

use uuid::Uuid;

use super::jwt::{generate_access_token, verify_token, JwtError};

/// Default lifetime of tokens minted locally
pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 900;

/// Verifies bearer tokens issued by the auth provider
#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
}

impl AuthService {
    pub fn new(jwt_secret: String) -> Self {
        Self { jwt_secret }
    }

    /// Resolve a bearer token to the current user id
    pub fn authenticate(&self, token: &str) -> Result<Uuid, JwtError> {
        verify_token(token, &self.jwt_secret)?.user_id()
    }

    /// Mint a token the way the auth provider would
    pub fn issue_token(&self, user_id: Uuid) -> Result<String, JwtError> {
        generate_access_token(user_id, &self.jwt_secret, ACCESS_TOKEN_TTL_SECONDS)
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService").finish_non_exhaustive()
    }
}
