//! Redis-backed article cache (optional).

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use super::{ArtikelCache, CacheError};

/// Redis cache for JSON-serialized articles.
///
/// Holds one multiplexed connection shared by all operations; clones of the
/// connection multiplex over the same underlying socket.
#[derive(Clone)]
pub struct RedisArtikelCache {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisArtikelCache {
    /// Connect to the Redis instance at `redis_url`.
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ArtikelCache for RedisArtikelCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // SETEX rejects a zero expiry; clamp to the minimum Redis accepts.
        let seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key, value, seconds)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }
}
