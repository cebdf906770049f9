//! In-memory article store.
//!
//! Intended for tests/dev. Transactions are serialized through a single gate,
//! which models the row-lock behavior of the SQL backend (strictly coarser:
//! one transaction at a time). Write failures can be injected per
//! `artikelnummer` to exercise retry and rollback paths.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use async_trait::async_trait;
use stammdaten_artikel::{Artikel, ArtikelFilter, ArtikelId};

use super::{ArtikelStore, ArtikelTx, StorageError};

#[derive(Debug, Default)]
struct StoreInner {
    rows: RwLock<HashMap<ArtikelId, Artikel>>,
    induced_failures: RwLock<HashMap<String, u32>>,
}

impl StoreInner {
    /// Consume one induced failure for this business key, if any remain.
    fn check_induced_failure(&self, artikelnummer: &str) -> Result<(), StorageError> {
        let mut failures = self
            .induced_failures
            .write()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;

        if let Some(remaining) = failures.get_mut(artikelnummer) {
            *remaining -= 1;
            if *remaining == 0 {
                failures.remove(artikelnummer);
            }
            return Err(StorageError::Backend(format!(
                "induced write failure for {artikelnummer}"
            )));
        }
        Ok(())
    }

    fn duplicate_artikelnummer(
        rows: &HashMap<ArtikelId, Artikel>,
        artikel: &Artikel,
    ) -> Option<String> {
        rows.values()
            .find(|existing| {
                existing.artikelnummer == artikel.artikelnummer && existing.id != artikel.id
            })
            .map(|existing| existing.artikelnummer.clone())
    }
}

/// In-memory article store for tests/dev.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtikelStore {
    inner: Arc<StoreInner>,
    tx_gate: Arc<Mutex<()>>,
}

impl InMemoryArtikelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` writes touching `artikelnummer` fail with a
    /// backend error. Counted across transactions, so a retried chunk sees
    /// the failure burn down attempt by attempt.
    pub fn fail_writes(&self, artikelnummer: &str, times: u32) {
        if times == 0 {
            return;
        }
        if let Ok(mut failures) = self.inner.induced_failures.write() {
            failures.insert(artikelnummer.to_string(), times);
        }
    }
}

fn matches(artikel: &Artikel, filter: &ArtikelFilter) -> bool {
    if let Some(bezeichnung) = &filter.bezeichnung {
        if !artikel
            .bezeichnung
            .to_lowercase()
            .contains(&bezeichnung.to_lowercase())
        {
            return false;
        }
    }
    if let Some(kategorie) = &filter.kategorie {
        if &artikel.kategorie != kategorie {
            return false;
        }
    }
    if let Some(lieferant) = &filter.lieferant {
        if &artikel.lieferant != lieferant {
            return false;
        }
    }
    if let Some(preis_min) = filter.preis_min {
        if artikel.preis < preis_min {
            return false;
        }
    }
    if let Some(preis_max) = filter.preis_max {
        if artikel.preis > preis_max {
            return false;
        }
    }
    if filter.nur_aktive && !artikel.aktiv {
        return false;
    }
    true
}

#[async_trait]
impl ArtikelStore for InMemoryArtikelStore {
    async fn fetch_by_id(&self, id: ArtikelId) -> Result<Option<Artikel>, StorageError> {
        let rows = self
            .inner
            .rows
            .read()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;
        Ok(rows.get(&id).cloned())
    }

    async fn fetch_by_artikelnummer(
        &self,
        artikelnummer: &str,
    ) -> Result<Option<Artikel>, StorageError> {
        let rows = self
            .inner
            .rows
            .read()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;
        Ok(rows
            .values()
            .find(|artikel| artikel.artikelnummer == artikelnummer)
            .cloned())
    }

    async fn insert(&self, artikel: &Artikel) -> Result<ArtikelId, StorageError> {
        self.inner.check_induced_failure(&artikel.artikelnummer)?;

        let mut rows = self
            .inner
            .rows
            .write()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;

        if let Some(taken) = StoreInner::duplicate_artikelnummer(&rows, artikel) {
            return Err(StorageError::Duplicate(taken));
        }

        let id = ArtikelId::new();
        let mut stored = artikel.clone();
        stored.id = Some(id);
        rows.insert(id, stored);
        Ok(id)
    }

    async fn update(&self, artikel: &Artikel) -> Result<(), StorageError> {
        self.inner.check_induced_failure(&artikel.artikelnummer)?;

        let Some(id) = artikel.id else {
            return Err(StorageError::MissingRow(
                "update requires a persisted article (id is unset)".to_string(),
            ));
        };

        let mut rows = self
            .inner
            .rows
            .write()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;

        if !rows.contains_key(&id) {
            return Err(StorageError::MissingRow(format!("artikel {id}")));
        }
        if let Some(taken) = StoreInner::duplicate_artikelnummer(&rows, artikel) {
            return Err(StorageError::Duplicate(taken));
        }

        rows.insert(id, artikel.clone());
        Ok(())
    }

    async fn search(&self, filter: &ArtikelFilter) -> Result<Vec<Artikel>, StorageError> {
        let rows = self
            .inner
            .rows
            .read()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;

        let mut hits: Vec<Artikel> = rows
            .values()
            .filter(|artikel| matches(artikel, filter))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.bezeichnung.cmp(&b.bezeichnung));

        let offset = filter.offset.max(0) as usize;
        let limit = filter.limit.max(0) as usize;
        Ok(hits.into_iter().skip(offset).take(limit).collect())
    }

    async fn begin(&self) -> Result<Box<dyn ArtikelTx>, StorageError> {
        let guard = self.tx_gate.clone().lock_owned().await;
        Ok(Box::new(MemArtikelTx {
            inner: self.inner.clone(),
            staged: HashMap::new(),
            _guard: guard,
        }))
    }
}

/// One open in-memory transaction. Writes are staged and only become visible
/// on commit; dropping the transaction discards them.
struct MemArtikelTx {
    inner: Arc<StoreInner>,
    staged: HashMap<ArtikelId, Artikel>,
    _guard: OwnedMutexGuard<()>,
}

impl MemArtikelTx {
    fn current(&self, id: ArtikelId) -> Result<Option<Artikel>, StorageError> {
        if let Some(staged) = self.staged.get(&id) {
            return Ok(Some(staged.clone()));
        }
        let rows = self
            .inner
            .rows
            .read()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;
        Ok(rows.get(&id).cloned())
    }
}

#[async_trait]
impl ArtikelTx for MemArtikelTx {
    async fn insert(&mut self, artikel: &Artikel) -> Result<ArtikelId, StorageError> {
        self.inner.check_induced_failure(&artikel.artikelnummer)?;

        {
            let rows = self
                .inner
                .rows
                .read()
                .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;
            if let Some(taken) = StoreInner::duplicate_artikelnummer(&rows, artikel) {
                return Err(StorageError::Duplicate(taken));
            }
        }
        if self
            .staged
            .values()
            .any(|staged| staged.artikelnummer == artikel.artikelnummer)
        {
            return Err(StorageError::Duplicate(artikel.artikelnummer.clone()));
        }

        let id = ArtikelId::new();
        let mut stored = artikel.clone();
        stored.id = Some(id);
        self.staged.insert(id, stored);
        Ok(id)
    }

    async fn update(&mut self, artikel: &Artikel) -> Result<(), StorageError> {
        self.inner.check_induced_failure(&artikel.artikelnummer)?;

        let Some(id) = artikel.id else {
            return Err(StorageError::MissingRow(
                "update requires a persisted article (id is unset)".to_string(),
            ));
        };
        if self.current(id)?.is_none() {
            return Err(StorageError::MissingRow(format!("artikel {id}")));
        }

        self.staged.insert(id, artikel.clone());
        Ok(())
    }

    async fn fetch_for_update(&mut self, id: ArtikelId) -> Result<Option<Artikel>, StorageError> {
        // The tx gate is held for the lifetime of this transaction, so the
        // read is already serialized against every other transaction.
        self.current(id)
    }

    async fn set_lagerbestand(
        &mut self,
        id: ArtikelId,
        lagerbestand: i64,
        geaendert_am: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let Some(mut artikel) = self.current(id)? else {
            return Err(StorageError::MissingRow(format!("artikel {id}")));
        };
        artikel.lagerbestand = lagerbestand;
        artikel.geaendert_am = geaendert_am;
        self.staged.insert(id, artikel);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let mut rows = self
            .inner
            .rows
            .write()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;
        for (id, artikel) in self.staged {
            rows.insert(id, artikel);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        // Staged writes are simply dropped.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stammdaten_artikel::ArtikelDraft;

    fn artikel(nummer: &str, bezeichnung: &str) -> Artikel {
        Artikel::from_draft(ArtikelDraft {
            artikelnummer: Some(nummer.to_string()),
            bezeichnung: Some(bezeichnung.to_string()),
            preis: Some(10.0),
            lagerbestand: Some(5),
            max_bestand: Some(100),
            ..ArtikelDraft::default()
        })
    }

    #[tokio::test]
    async fn insert_assigns_id_and_fetch_round_trips() {
        let store = InMemoryArtikelStore::new();

        let id = store.insert(&artikel("A-1", "Test")).await.unwrap();
        let stored = store.fetch_by_id(id).await.unwrap().unwrap();

        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.artikelnummer, "A-1");

        let by_nummer = store.fetch_by_artikelnummer("A-1").await.unwrap().unwrap();
        assert_eq!(by_nummer.id, Some(id));
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_artikelnummer() {
        let store = InMemoryArtikelStore::new();
        store.insert(&artikel("A-1", "Test")).await.unwrap();

        let err = store.insert(&artikel("A-1", "Andere")).await.unwrap_err();
        assert!(matches!(err, StorageError::Duplicate(_)));
    }

    #[tokio::test]
    async fn update_rejects_unknown_row() {
        let store = InMemoryArtikelStore::new();

        let mut unknown = artikel("A-9", "Geist");
        unknown.id = Some(ArtikelId::new());

        let err = store.update(&unknown).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingRow(_)));
    }

    #[tokio::test]
    async fn search_orders_and_paginates() {
        let store = InMemoryArtikelStore::new();
        store.insert(&artikel("A-3", "Zange")).await.unwrap();
        store.insert(&artikel("A-1", "Bohrer")).await.unwrap();
        store.insert(&artikel("A-2", "Hammer")).await.unwrap();

        let filter = ArtikelFilter {
            limit: 2,
            ..ArtikelFilter::default()
        };
        let hits = store.search(&filter).await.unwrap();
        let namen: Vec<&str> = hits.iter().map(|a| a.bezeichnung.as_str()).collect();
        assert_eq!(namen, vec!["Bohrer", "Hammer"]);

        let filter = ArtikelFilter {
            limit: 2,
            offset: 2,
            ..ArtikelFilter::default()
        };
        let hits = store.search(&filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].bezeichnung, "Zange");
    }

    #[tokio::test]
    async fn transaction_commit_publishes_staged_writes() {
        let store = InMemoryArtikelStore::new();

        let mut tx = store.begin().await.unwrap();
        let id = tx.insert(&artikel("A-1", "Test")).await.unwrap();
        // Not visible before commit.
        assert!(store.fetch_by_id(id).await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert!(store.fetch_by_id(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn transaction_rollback_discards_staged_writes() {
        let store = InMemoryArtikelStore::new();

        let mut tx = store.begin().await.unwrap();
        let id = tx.insert(&artikel("A-1", "Test")).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.fetch_by_id(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn induced_failures_burn_down_per_write() {
        let store = InMemoryArtikelStore::new();
        store.fail_writes("A-1", 2);

        assert!(store.insert(&artikel("A-1", "Test")).await.is_err());
        assert!(store.insert(&artikel("A-1", "Test")).await.is_err());
        assert!(store.insert(&artikel("A-1", "Test")).await.is_ok());
    }
}
