//! Authentication and authorization
//!
//! - JWT verification of staff tokens
//! - Roles mapped to repayment capabilities

mod jwt;
mod roles;

pub use jwt::{generate_access_token, verify_token, Claims, JwtError};
pub use roles::{Actor, Capability, Role};

/// Holds the token verification secret for the request extractors
#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
}

impl AuthService {
    pub fn new(jwt_secret: String) -> Self {
        Self { jwt_secret }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }
}
