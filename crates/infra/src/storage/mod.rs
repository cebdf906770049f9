//! Storage abstraction for article master data.
//!
//! Two implementations: [`postgres::PostgresArtikelStore`] for production and
//! [`memory::InMemoryArtikelStore`] for tests/dev. The manager only ever talks
//! to the traits; no other component writes to storage directly.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stammdaten_artikel::{Artikel, ArtikelFilter, ArtikelId};

/// Storage operation error.
///
/// These are **infrastructure errors** (connectivity, constraints, decoding)
/// as opposed to domain errors (validation, insufficient stock).
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The unique `artikelnummer` business key is already taken.
    #[error("duplicate artikelnummer: {0}")]
    Duplicate(String),

    /// A write targeted a row that does not exist.
    #[error("row not found: {0}")]
    MissingRow(String),

    /// A row read from storage did not match the expected shape.
    #[error("row decoding failed: {0}")]
    Decode(String),

    /// Failure reported by a non-SQL backend (in-memory store, tests).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistent store for articles.
///
/// Single-row reads and writes run directly against the pool; batch ingestion
/// and stock adjustment open an explicit transaction via [`begin`].
///
/// [`begin`]: ArtikelStore::begin
#[async_trait]
pub trait ArtikelStore: Send + Sync {
    /// Fetch one article by primary key. Absent rows are `Ok(None)`.
    async fn fetch_by_id(&self, id: ArtikelId) -> Result<Option<Artikel>, StorageError>;

    /// Fetch one article by its unique `artikelnummer` business key.
    async fn fetch_by_artikelnummer(
        &self,
        artikelnummer: &str,
    ) -> Result<Option<Artikel>, StorageError>;

    /// Insert a new row. Storage assigns and returns the identifier.
    async fn insert(&self, artikel: &Artikel) -> Result<ArtikelId, StorageError>;

    /// Full-row update of the row matching `artikel.id`; every persisted
    /// field is overwritten.
    async fn update(&self, artikel: &Artikel) -> Result<(), StorageError>;

    /// Run a conjunctive criteria search, ordered by `bezeichnung` ascending.
    async fn search(&self, filter: &ArtikelFilter) -> Result<Vec<Artikel>, StorageError>;

    /// Open an explicit transaction.
    async fn begin(&self) -> Result<Box<dyn ArtikelTx>, StorageError>;
}

/// Explicit storage transaction.
///
/// Writes become visible only on [`commit`]; dropping a transaction without
/// committing discards them. Row locks taken by [`fetch_for_update`] are held
/// until the transaction ends.
///
/// [`commit`]: ArtikelTx::commit
/// [`fetch_for_update`]: ArtikelTx::fetch_for_update
#[async_trait]
pub trait ArtikelTx: Send {
    /// Insert a new row inside the transaction; returns the assigned id.
    async fn insert(&mut self, artikel: &Artikel) -> Result<ArtikelId, StorageError>;

    /// Full-row update inside the transaction.
    async fn update(&mut self, artikel: &Artikel) -> Result<(), StorageError>;

    /// Read a row under a row lock (`SELECT … FOR UPDATE` semantics),
    /// serializing concurrent mutations of the same row.
    async fn fetch_for_update(&mut self, id: ArtikelId) -> Result<Option<Artikel>, StorageError>;

    /// Write a new stock level and modification timestamp for one row.
    async fn set_lagerbestand(
        &mut self,
        id: ArtikelId,
        lagerbestand: i64,
        geaendert_am: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}
