//! # np-auth-simple
//!
//! Argon2-based implementation of `AuthProvider`.
//! Tokens are issued by the external login service; this plugin only checks
//! a presented bearer token against the configured Argon2 PHC hash. Every
//! authenticated caller is an administrator.

use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use async_trait::async_trait;
use np_core::traits::AuthProvider;
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

pub struct SimpleAuthProvider {
    /// Argon2 PHC string of the admin token; `None` disables the check.
    token_hash: Option<SecretString>,
}

impl SimpleAuthProvider {
    pub fn new(token_hash: Option<SecretString>) -> Self {
        Self { token_hash }
    }

    /// Accepts every request.
    pub fn disabled() -> Self {
        Self { token_hash: None }
    }
}

#[async_trait]
impl AuthProvider for SimpleAuthProvider {
    fn is_enabled(&self) -> bool {
        self.token_hash.is_some()
    }

    async fn verify_bearer(&self, token: &str) -> bool {
        let Some(hash) = &self.token_hash else {
            return true;
        };
        let parsed_hash = match PasswordHash::new(hash.expose_secret()) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "configured admin token hash is not a valid PHC string");
                return false;
            }
        };
        Argon2::default()
            .verify_password(token.as_bytes(), &parsed_hash)
            .is_ok()
    }
}
