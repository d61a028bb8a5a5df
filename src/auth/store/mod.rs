//! Session token lifecycle against a key-value store with per-key expiry.
//!
//! The store owns session token creation, lookup, renewal, deletion and
//! pattern enumeration. Tokens are opaque strings of the form
//! `<prefix>:<random-suffix>`; the suffix is cryptographically random and
//! base64url-encoded so the whole token stays safe as a cookie value.
//!
//! Two session kinds exist with different expiry policies:
//! - **Login** sessions (`user:<id>:<random>`) renew their TTL to the full
//!   lifetime on every read, giving a sliding idle timeout.
//! - **Confirmation** sessions (`<email>:<random>`) keep the deadline fixed
//!   at creation; reading them never extends their life.
//!
//! Storage itself sits behind [`SessionBackend`] with a Redis implementation
//! for production and an in-memory implementation for tests.

mod memory;
mod redis;

pub use memory::InMemorySessionBackend;
pub use redis::RedisSessionBackend;

use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::instrument;

use crate::config::{Config, SessionConfig};

/// Errors surfaced by session store operations.
///
/// All variants map to a 5xx at the API boundary: a transient store failure
/// during a request must never silently succeed.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend did not answer within the configured operation timeout
    #[error("session store operation timed out")]
    Timeout,

    /// Backend-level failure (connection, protocol, ...)
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Raw key-value operations the session store is built on.
///
/// Implementations must treat `delete` as idempotent and support glob
/// patterns (at least `*`) in `keys`.
#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Reset the TTL of an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn delete(&self, keys: &[String]) -> Result<()>;

    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
}

/// Expiry policy class of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Long-lived browser session, TTL renewed on every read
    Login,
    /// Short-lived email confirmation session, fixed deadline
    Confirmation,
}

/// Session store: the single owner of session tokens.
///
/// Cheap to clone; the backend is shared behind an `Arc`.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    session: SessionConfig,
    op_timeout: Duration,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>, config: &Config) -> Self {
        Self {
            backend,
            session: config.auth.session.clone(),
            op_timeout: config.session_store.operation_timeout,
        }
    }

    /// Configured lifetime for a session kind.
    pub fn lifetime(&self, kind: SessionKind) -> Duration {
        match kind {
            SessionKind::Login => self.session.login_lifetime,
            SessionKind::Confirmation => self.session.confirmation_lifetime,
        }
    }

    /// Compose a fresh token: `<prefix>:<base64url(random bytes)>`.
    fn generate_token(&self, prefix: &str) -> String {
        let mut suffix = vec![0u8; self.session.token_bytes];
        rand::rng().fill_bytes(&mut suffix);
        format!("{}:{}", prefix, general_purpose::URL_SAFE_NO_PAD.encode(suffix))
    }

    /// Create a session under a fresh token and return the token.
    #[instrument(skip(self, payload))]
    pub async fn create(&self, prefix: &str, payload: &str, kind: SessionKind) -> Result<String> {
        let token = self.generate_token(prefix);
        self.bounded(self.backend.set(&token, payload, self.lifetime(kind))).await?;
        Ok(token)
    }

    /// Read a session payload.
    ///
    /// Login sessions get their TTL renewed to the full lifetime on every
    /// successful read; confirmation sessions are left untouched.
    #[instrument(skip(self, token))]
    pub async fn read(&self, token: &str, kind: SessionKind) -> Result<Option<String>> {
        let payload = self.bounded(self.backend.get(token)).await?;
        if payload.is_some() && kind == SessionKind::Login {
            self.bounded(self.backend.expire(token, self.lifetime(kind))).await?;
        }
        Ok(payload)
    }

    pub async fn exists(&self, token: &str) -> Result<bool> {
        self.bounded(self.backend.exists(token)).await
    }

    /// Delete one or more sessions. Deleting an absent token is not an error.
    pub async fn delete(&self, tokens: &[String]) -> Result<()> {
        if tokens.is_empty() {
            return Ok(());
        }
        self.bounded(self.backend.delete(tokens)).await
    }

    /// Enumerate tokens matching a glob pattern, e.g. `user:<id>:*`.
    pub async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        self.bounded(self.backend.keys(pattern)).await
    }

    /// Delete every session matching a glob pattern. Returns the count removed.
    #[instrument(skip(self))]
    pub async fn delete_matching(&self, pattern: &str) -> Result<usize> {
        let tokens = self.keys_matching(pattern).await?;
        self.delete(&tokens).await?;
        Ok(tokens.len())
    }

    /// Probe the backend with a write-then-delete round trip.
    ///
    /// Used by the startup connectivity check; a failure here is fatal for
    /// the process once the retry budget is exhausted.
    pub async fn check_connectivity(&self) -> Result<()> {
        let probe = self.generate_token("connectivity-probe");
        self.bounded(self.backend.set(&probe, "", Duration::from_secs(10))).await?;
        self.bounded(self.backend.delete(std::slice::from_ref(&probe))).await
    }

    async fn bounded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        timeout(self.op_timeout, op).await.map_err(|_| StoreError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_store() -> SessionStore {
        let mut config = Config::default();
        config.auth.session.confirmation_lifetime = Duration::from_secs(60);
        SessionStore::new(Arc::new(InMemorySessionBackend::new()), &config)
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = test_store();

        let token = store.create("user:1", "{\"id\":1}", SessionKind::Login).await.unwrap();
        assert!(token.starts_with("user:1:"));
        assert!(store.exists(&token).await.unwrap());

        let payload = store.read(&token, SessionKind::Login).await.unwrap();
        assert_eq!(payload.as_deref(), Some("{\"id\":1}"));

        store.delete(std::slice::from_ref(&token)).await.unwrap();
        assert!(!store.exists(&token).await.unwrap());
        assert_eq!(store.read(&token, SessionKind::Login).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = test_store();
        store.delete(&["user:1:does-not-exist".to_string()]).await.unwrap();
        store.delete(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let store = test_store();
        let a = store.create("user:1", "", SessionKind::Login).await.unwrap();
        let b = store.create("user:1", "", SessionKind::Login).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_keys_matching_prefix() {
        let store = test_store();
        let email_session = store.create("a@example.com", "", SessionKind::Confirmation).await.unwrap();
        store.create("user:1234", "", SessionKind::Login).await.unwrap();
        store.create("user:23455", "", SessionKind::Login).await.unwrap();

        let keys = store.keys_matching("user:*").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(!keys.contains(&email_session));

        let keys = store.keys_matching("a@example.com:*").await.unwrap();
        assert_eq!(keys, vec![email_session]);
    }

    #[tokio::test]
    async fn test_delete_matching() {
        let store = test_store();
        store.create("user:1", "", SessionKind::Login).await.unwrap();
        store.create("user:1", "", SessionKind::Login).await.unwrap();
        let other = store.create("user:2", "", SessionKind::Login).await.unwrap();

        let removed = store.delete_matching("user:1:*").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.exists(&other).await.unwrap());
        assert!(store.keys_matching("user:1:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_is_absent() {
        let mut config = Config::default();
        config.auth.session.confirmation_lifetime = Duration::from_millis(20);
        let store = SessionStore::new(Arc::new(InMemorySessionBackend::new()), &config);

        let token = store.create("b@example.com", "payload", SessionKind::Confirmation).await.unwrap();
        assert!(store.exists(&token).await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.exists(&token).await.unwrap());
        assert_eq!(store.read(&token, SessionKind::Confirmation).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_read_renews_expiry() {
        let mut config = Config::default();
        config.auth.session.login_lifetime = Duration::from_millis(80);
        let store = SessionStore::new(Arc::new(InMemorySessionBackend::new()), &config);

        let token = store.create("user:1", "", SessionKind::Login).await.unwrap();

        // Keep reading past the original deadline; each read renews
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(store.read(&token, SessionKind::Login).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_confirmation_read_does_not_renew() {
        let mut config = Config::default();
        config.auth.session.confirmation_lifetime = Duration::from_millis(80);
        let store = SessionStore::new(Arc::new(InMemorySessionBackend::new()), &config);

        let token = store.create("c@example.com", "id", SessionKind::Confirmation).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.read(&token, SessionKind::Confirmation).await.unwrap().is_some());

        // The read above must not have pushed the deadline out
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.read(&token, SessionKind::Confirmation).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_check_connectivity() {
        let store = test_store();
        store.check_connectivity().await.unwrap();
        assert!(store.keys_matching("connectivity-probe:*").await.unwrap().is_empty());
    }
}
