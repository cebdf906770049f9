//! In-memory TTL cache.
//!
//! Intended for tests/dev. Expiry is enforced lazily on read.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{ArtikelCache, CacheError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory cache for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtikelCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CacheError::Backend("lock poisoned".to_string()))?;

        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| CacheError::Backend("lock poisoned".to_string()))?;

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| CacheError::Backend("lock poisoned".to_string()))?;

        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let cache = InMemoryCache::new();

        cache
            .set("artikel:id:1", "{}", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            cache.get("artikel:id:1").await.unwrap(),
            Some("{}".to_string())
        );

        cache.delete("artikel:id:1").await.unwrap();
        assert_eq!(cache.get("artikel:id:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_read_as_miss() {
        let cache = InMemoryCache::new();

        cache
            .set("artikel:id:1", "{}", Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(cache.get("artikel:id:1").await.unwrap(), None);
    }
}
