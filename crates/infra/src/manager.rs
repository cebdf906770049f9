//! Article manager: orchestrates storage, caching, batch ingestion and
//! inventory mutation.
//!
//! The manager exclusively owns the read/write path to storage and cache;
//! upstream request handlers go through it and never touch either directly.
//! Storage and cache are injected, so tests substitute the in-memory
//! backends.
//!
//! Cache discipline: reads populate, writes invalidate. Every article is
//! cached under two keys (id and artikelnummer) and both are invalidated on
//! every write, so a read immediately after a write always hits storage.
//! Cache failures are logged and swallowed; a cache outage degrades to
//! storage-only operation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{instrument, warn};

use stammdaten_artikel::{Artikel, ArtikelFilter, ArtikelId};
use stammdaten_core::DomainError;

use crate::cache::{self, ArtikelCache};
use crate::storage::{ArtikelStore, ArtikelTx, StorageError};

/// Manager operation error: either a domain failure (validation, not-found,
/// insufficient stock) or an infrastructure failure.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Retry policy for chunk transactions in batch processing. Fixed delay
/// between attempts; tests run with a zero delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per chunk, first try included. 0 is treated as 1.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Expiry for cache entries populated on read. Default 1 hour.
    pub cache_ttl: Duration,
    /// Chunk size for batch processing. Default 1000.
    pub batch_size: usize,
    /// Retry policy for chunk transactions.
    pub retry: RetryPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            batch_size: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

/// One failed batch entry, paired with the failure reason.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub artikel: Artikel,
    pub error: String,
}

/// Outcome of [`ArtikelManager::process_batch`]. Every input article lands in
/// exactly one of the two lists.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub successful: Vec<Artikel>,
    pub failed: Vec<BatchFailure>,
}

/// Orchestrates storage, caching, batch ingestion and stock adjustment for
/// article master data.
#[derive(Clone)]
pub struct ArtikelManager {
    store: Arc<dyn ArtikelStore>,
    cache: Arc<dyn ArtikelCache>,
    config: ManagerConfig,
}

impl ArtikelManager {
    pub fn new(store: Arc<dyn ArtikelStore>, cache: Arc<dyn ArtikelCache>) -> Self {
        Self::with_config(store, cache, ManagerConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn ArtikelStore>,
        cache: Arc<dyn ArtikelCache>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    /// Look up one article by id. Absent articles are `Ok(None)`, not an
    /// error. Populates the cache on a storage hit.
    #[instrument(skip(self), fields(artikel_id = %id), err)]
    pub async fn get_by_id(&self, id: ArtikelId) -> ManagerResult<Option<Artikel>> {
        let key = cache::id_key(id);
        if let Some(artikel) = self.cache_lookup(&key).await {
            return Ok(Some(artikel));
        }

        let Some(artikel) = self.store.fetch_by_id(id).await? else {
            return Ok(None);
        };

        self.cache_store(&key, &artikel).await;
        Ok(Some(artikel))
    }

    /// Look up one article by its `artikelnummer` business key, with the same
    /// cache discipline as [`get_by_id`](Self::get_by_id).
    #[instrument(skip(self), err)]
    pub async fn get_by_artikelnummer(
        &self,
        artikelnummer: &str,
    ) -> ManagerResult<Option<Artikel>> {
        let key = cache::nummer_key(artikelnummer);
        if let Some(artikel) = self.cache_lookup(&key).await {
            return Ok(Some(artikel));
        }

        let Some(artikel) = self.store.fetch_by_artikelnummer(artikelnummer).await? else {
            return Ok(None);
        };

        self.cache_store(&key, &artikel).await;
        Ok(Some(artikel))
    }

    /// Persist one article. Validates first and fails fast with no side
    /// effects. Inserts when `id` is unset (the storage-assigned id is
    /// written back), otherwise overwrites the full row. Both cache keys are
    /// invalidated afterwards, so the next read hits storage.
    #[instrument(skip(self, artikel), fields(artikelnummer = %artikel.artikelnummer), err)]
    pub async fn save(&self, mut artikel: Artikel) -> ManagerResult<Artikel> {
        artikel.validate()?;

        let now = Utc::now();
        artikel.geaendert_am = now;

        match artikel.id {
            None => {
                artikel.erstellt_am = now;
                let id = self.store.insert(&artikel).await?;
                artikel.id = Some(id);
            }
            Some(_) => {
                self.store.update(&artikel).await?;
            }
        }

        self.invalidate(artikel.id, &artikel.artikelnummer).await;
        Ok(artikel)
    }

    /// Criteria search, ordered by `bezeichnung` ascending. Bypasses the
    /// cache entirely; search results are never cached.
    #[instrument(skip(self, filter), err)]
    pub async fn search(&self, filter: &ArtikelFilter) -> ManagerResult<Vec<Artikel>> {
        Ok(self.store.search(filter).await?)
    }

    /// Persist a large set of articles in chunked transactions.
    ///
    /// The input is split into chunks of `config.batch_size`. Per chunk:
    /// validation failures are itemized up front and never start a
    /// transaction; the remaining articles are written inside one
    /// transaction. A storage failure rolls the chunk back and the whole
    /// chunk attempt is retried after `config.retry.delay`, up to
    /// `config.retry.max_attempts` attempts; once exhausted, every article of
    /// the chunk is reported failed. Chunks are independent of each other, so
    /// one malformed chunk never aborts the rest of a large import.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn process_batch(&self, items: Vec<Artikel>) -> BatchResult {
        let mut result = BatchResult::default();
        let chunk_size = self.config.batch_size.max(1);

        for chunk in items.chunks(chunk_size) {
            self.process_chunk(chunk, &mut result).await;
        }

        result
    }

    async fn process_chunk(&self, chunk: &[Artikel], result: &mut BatchResult) {
        // Validation failures never reach storage and never trigger a
        // rollback; valid chunk-mates commit normally.
        let mut valid: Vec<Artikel> = Vec::with_capacity(chunk.len());
        for artikel in chunk {
            match artikel.validate() {
                Ok(()) => valid.push(artikel.clone()),
                Err(e) => result.failed.push(BatchFailure {
                    artikel: artikel.clone(),
                    error: e.to_string(),
                }),
            }
        }
        if valid.is_empty() {
            return;
        }

        let attempts = self.config.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.persist_chunk(&valid).await {
                Ok(saved) => {
                    for artikel in &saved {
                        self.invalidate(artikel.id, &artikel.artikelnummer).await;
                    }
                    result.successful.extend(saved);
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "chunk transaction failed, rolled back");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry.delay).await;
                    }
                }
            }
        }

        for artikel in valid {
            result.failed.push(BatchFailure {
                artikel,
                error: format!("chunk rolled back after {attempts} attempts: {last_error}"),
            });
        }
    }

    /// One chunk attempt: a fresh transaction covering every article. The
    /// transaction is rolled back on the first failed write; retrying a
    /// statement inside an aborted transaction cannot succeed, so retry
    /// restarts the whole chunk.
    async fn persist_chunk(&self, items: &[Artikel]) -> Result<Vec<Artikel>, StorageError> {
        let mut tx = self.store.begin().await?;
        let now = Utc::now();
        let mut saved = Vec::with_capacity(items.len());

        for artikel in items {
            let mut artikel = artikel.clone();
            artikel.geaendert_am = now;

            let outcome = match artikel.id {
                None => {
                    artikel.erstellt_am = now;
                    tx.insert(&artikel).await.map(|id| artikel.id = Some(id))
                }
                Some(_) => tx.update(&artikel).await,
            };

            if let Err(e) = outcome {
                rollback_quietly(tx).await;
                return Err(e);
            }
            saved.push(artikel);
        }

        tx.commit().await?;
        Ok(saved)
    }

    /// Adjust the stock of one article by a signed delta (positive receipt,
    /// negative issue) under a storage row lock, so concurrent adjustments to
    /// the same article serialize and can never interleave into a negative or
    /// lost-update balance.
    #[instrument(skip(self), fields(artikel_id = %id, delta), err)]
    pub async fn update_lagerbestand(&self, id: ArtikelId, delta: i64) -> ManagerResult<Artikel> {
        let mut tx = self.store.begin().await?;

        let current = match tx.fetch_for_update(id).await {
            Ok(current) => current,
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(e.into());
            }
        };
        let Some(current) = current else {
            rollback_quietly(tx).await;
            return Err(DomainError::not_found().into());
        };

        let neuer_bestand = current.lagerbestand + delta;
        if neuer_bestand < 0 {
            rollback_quietly(tx).await;
            return Err(DomainError::insufficient_stock(current.lagerbestand, delta).into());
        }

        if let Err(e) = tx.set_lagerbestand(id, neuer_bestand, Utc::now()).await {
            rollback_quietly(tx).await;
            return Err(e.into());
        }
        tx.commit().await?;

        self.invalidate(Some(id), &current.artikelnummer).await;

        // Re-read through the cache path so the fresh state is repopulated.
        let artikel = self.get_by_id(id).await?;
        artikel.ok_or_else(|| DomainError::not_found().into())
    }

    /// Soft delete: clear the `aktiv` flag and persist. The row is kept;
    /// default searches stop returning it.
    #[instrument(skip(self), fields(artikel_id = %id), err)]
    pub async fn deactivate(&self, id: ArtikelId) -> ManagerResult<Artikel> {
        let Some(mut artikel) = self.get_by_id(id).await? else {
            return Err(DomainError::not_found().into());
        };
        artikel.aktiv = false;
        self.save(artikel).await
    }

    async fn cache_lookup(&self, key: &str) -> Option<Artikel> {
        match self.cache.get(key).await {
            Ok(Some(text)) => match serde_json::from_str(&text) {
                Ok(artikel) => Some(artikel),
                Err(e) => {
                    warn!(key, error = %e, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "cache get failed, falling back to storage");
                None
            }
        }
    }

    async fn cache_store(&self, key: &str, artikel: &Artikel) {
        match serde_json::to_string(artikel) {
            Ok(text) => {
                if let Err(e) = self.cache.set(key, &text, self.config.cache_ttl).await {
                    warn!(key, error = %e, "cache set failed");
                }
            }
            Err(e) => warn!(key, error = %e, "article serialization for cache failed"),
        }
    }

    async fn invalidate(&self, id: Option<ArtikelId>, artikelnummer: &str) {
        if let Some(id) = id {
            if let Err(e) = self.cache.delete(&cache::id_key(id)).await {
                warn!(artikel_id = %id, error = %e, "cache invalidation failed");
            }
        }
        if let Err(e) = self.cache.delete(&cache::nummer_key(artikelnummer)).await {
            warn!(artikelnummer, error = %e, "cache invalidation failed");
        }
    }
}

async fn rollback_quietly(tx: Box<dyn ArtikelTx>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "transaction rollback failed");
    }
}
