//! Key/value cache abstraction for serialized articles.
//!
//! The cache is best-effort: the manager guards every call and degrades to
//! storage-only operation when the cache misbehaves.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use stammdaten_artikel::ArtikelId;

/// Cache operation error.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Key/value cache holding JSON-serialized articles.
#[async_trait]
pub trait ArtikelCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Cache key for the id lookup path.
///
/// All key derivation lives in this module so that lookup and invalidation
/// cannot drift apart.
pub fn id_key(id: ArtikelId) -> String {
    format!("artikel:id:{id}")
}

/// Cache key for the `artikelnummer` lookup path.
pub fn nummer_key(artikelnummer: &str) -> String {
    format!("artikel:nummer:{artikelnummer}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_namespaces_do_not_collide() {
        let id = ArtikelId::new();

        assert!(id_key(id).starts_with("artikel:id:"));
        assert!(nummer_key("A-1").starts_with("artikel:nummer:"));
        assert_ne!(id_key(id), nummer_key(&id.to_string()));
    }
}
