//! Redis-backed session storage for production.

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{Result, SessionBackend, StoreError};

/// Session backend on top of Redis.
///
/// The connection manager multiplexes a single connection and reconnects
/// transparently; clones share the underlying connection.
#[derive(Clone)]
pub struct RedisSessionBackend {
    conn: ConnectionManager,
}

impl RedisSessionBackend {
    /// Open a client and establish the managed connection.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Backend(e.into()))?;
        let conn = client.get_connection_manager().await.map_err(|e| StoreError::Backend(e.into()))?;
        Ok(Self { conn })
    }
}

fn backend_err(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.into())
}

#[async_trait::async_trait]
impl SessionBackend for RedisSessionBackend {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await.map_err(backend_err)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(backend_err)?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let renewed: bool = conn.expire(key, ttl.as_secs().max(1) as i64).await.map_err(backend_err)?;
        Ok(renewed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await.map_err(backend_err)?;
        Ok(exists)
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys.to_vec()).await.map_err(backend_err)?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(pattern).await.map_err(backend_err)?;
        Ok(keys)
    }
}
