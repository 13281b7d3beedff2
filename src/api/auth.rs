//! Credential verification and bearer tokens
//!
//! The credential store is an injected trait so deployments can back it
//! with whatever directory they have; the default in-memory store holds
//! argon2 hashes built from configuration at startup. Token signing secret
//! material comes from configuration or the environment, never a constant.

use std::collections::HashMap;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::state::AppState;
use crate::config::AuthConfig;
use crate::error::{PipelineError, Result};

/// Verifies a (username, password) pair against some backing store.
pub trait CredentialStore: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// In-memory store over argon2 password hashes
#[derive(Default)]
pub struct MemoryCredentialStore {
    hashes: HashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, username: &str, password: &str) -> anyhow::Result<()> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
        self.hashes.insert(username.to_string(), hash.to_string());
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn verify(&self, username: &str, password: &str) -> bool {
        let Some(stored) = self.hashes.get(username) else {
            return false;
        };
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Issues and validates bearer tokens against the injected store
pub struct AuthService {
    store: Box<dyn CredentialStore>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_expiry: Duration,
}

impl AuthService {
    /// Build from configuration: bootstrap user from config/env, random
    /// ephemeral signing secret when none is supplied.
    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        let mut store = MemoryCredentialStore::new();
        if config.bootstrap_password.is_empty() {
            warn!(
                "No bootstrap password configured; set NETWARDEN_BOOTSTRAP_PASSWORD \
                 to enable the {} user",
                config.bootstrap_user
            );
        } else {
            store.add_user(&config.bootstrap_user, &config.bootstrap_password)?;
        }

        let secret = if config.jwt_secret.is_empty() {
            warn!("No token secret configured; using an ephemeral one, tokens will not survive restarts");
            let mut bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            bytes.to_vec()
        } else {
            config.jwt_secret.as_bytes().to_vec()
        };

        Ok(Self::with_store(
            Box::new(store),
            &secret,
            Duration::minutes(config.token_expiry_mins),
        ))
    }

    /// Inject an arbitrary credential store; used directly by tests.
    pub fn with_store(
        store: Box<dyn CredentialStore>,
        secret: &[u8],
        token_expiry: Duration,
    ) -> Self {
        Self {
            store,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            token_expiry,
        }
    }

    pub fn verify_credentials(&self, username: &str, password: &str) -> bool {
        self.store.verify(username, password)
    }

    pub fn issue_token(&self, username: &str) -> Result<String> {
        let claims = Claims {
            sub: username.to_string(),
            exp: (Utc::now() + self.token_expiry).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| PipelineError::Internal(format!("token signing failed: {e}")))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| PipelineError::Unauthorized)
    }
}

/// Middleware: require a valid bearer token on every protected route.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> std::result::Result<Response, PipelineError> {
    let token = extract_bearer_token(&req)?;
    let claims = state.auth.validate_token(&token)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn extract_bearer_token(req: &Request) -> Result<String> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or(PipelineError::Unauthorized)?
        .to_str()
        .map_err(|_| PipelineError::Unauthorized)?;

    header
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
        .ok_or(PipelineError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        let mut store = MemoryCredentialStore::new();
        store.add_user("admin", "hunter2").unwrap();
        AuthService::with_store(Box::new(store), b"test-secret", Duration::minutes(5))
    }

    #[test]
    fn test_verify_credentials() {
        let auth = service();
        assert!(auth.verify_credentials("admin", "hunter2"));
        assert!(!auth.verify_credentials("admin", "wrong"));
        assert!(!auth.verify_credentials("nobody", "hunter2"));
    }

    #[test]
    fn test_token_round_trip() {
        let auth = service();
        let token = auth.issue_token("admin").unwrap();
        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "admin");
    }

    #[test]
    fn test_garbage_token_rejected() {
        let auth = service();
        assert!(auth.validate_token("not.a.token").is_err());
    }

    #[test]
    fn test_tokens_are_bound_to_secret() {
        let auth_a = service();
        let other = AuthService::with_store(
            Box::new(MemoryCredentialStore::new()),
            b"different-secret",
            Duration::minutes(5),
        );
        let token = auth_a.issue_token("admin").unwrap();
        assert!(other.validate_token(&token).is_err());
    }
}
