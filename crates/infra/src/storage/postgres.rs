//! Postgres-backed article store.
//!
//! Schema lives in `migrations/0001_artikel.sql`. The `artikelnummer`
//! business key is unique at the database level; the non-negative price/stock
//! and ordered min/max bounds are also enforced as check constraints, so the
//! database rejects anything the domain validation missed.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StorageError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StorageError | Scenario |
//! |------------|----------------------|--------------|----------|
//! | Database (unique violation) | `23505` | `Duplicate` | `artikelnummer` already taken |
//! | Database (other) | Any other | `Database` | Constraint/connectivity failures |
//! | Other | N/A | `Database` | Network errors, pool closed, etc. |
//!
//! ## Thread Safety
//!
//! Uses the SQLx connection pool which is thread-safe (Arc + Send + Sync).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::instrument;

use async_trait::async_trait;
use stammdaten_artikel::{Artikel, ArtikelFilter, ArtikelId};

use super::{ArtikelStore, ArtikelTx, StorageError};

const SELECT_COLUMNS: &str = "\
    id, artikelnummer, bezeichnung, beschreibung, kategorie, lieferant, \
    tags, dimension, gewicht, preis, waehrung, einheit, \
    lagerbestand, min_bestand, max_bestand, aktiv, erstellt_am, geaendert_am";

/// Postgres-backed article store.
#[derive(Debug, Clone)]
pub struct PostgresArtikelStore {
    pool: Arc<PgPool>,
}

impl PostgresArtikelStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn row_to_artikel(row: &PgRow) -> Result<Artikel, StorageError> {
    let id: uuid::Uuid = row.try_get("id")?;
    let tags: Json<BTreeSet<String>> = row.try_get("tags")?;
    let dimension: Json<BTreeMap<String, String>> = row.try_get("dimension")?;

    Ok(Artikel {
        id: Some(ArtikelId::from_uuid(id)),
        artikelnummer: row.try_get("artikelnummer")?,
        bezeichnung: row.try_get("bezeichnung")?,
        beschreibung: row.try_get("beschreibung")?,
        kategorie: row.try_get("kategorie")?,
        lieferant: row.try_get("lieferant")?,
        tags: tags.0,
        dimension: dimension.0,
        gewicht: row.try_get("gewicht")?,
        preis: row.try_get("preis")?,
        waehrung: row.try_get("waehrung")?,
        einheit: row.try_get("einheit")?,
        lagerbestand: row.try_get("lagerbestand")?,
        min_bestand: row.try_get("min_bestand")?,
        max_bestand: row.try_get("max_bestand")?,
        aktiv: row.try_get("aktiv")?,
        erstellt_am: row.try_get("erstellt_am")?,
        geaendert_am: row.try_get("geaendert_am")?,
    })
}

/// Map a write error, turning a unique violation on the business key into
/// the dedicated duplicate error.
fn map_write_error(artikelnummer: &str, err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            return StorageError::Duplicate(artikelnummer.to_string());
        }
    }
    StorageError::Database(err)
}

/// Escape LIKE wildcards in user-supplied substrings.
fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[async_trait]
impl ArtikelStore for PostgresArtikelStore {
    #[instrument(skip(self), fields(artikel_id = %id), err)]
    async fn fetch_by_id(&self, id: ArtikelId) -> Result<Option<Artikel>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM artikel WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(row_to_artikel).transpose()
    }

    #[instrument(skip(self), err)]
    async fn fetch_by_artikelnummer(
        &self,
        artikelnummer: &str,
    ) -> Result<Option<Artikel>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM artikel WHERE artikelnummer = $1"
        ))
        .bind(artikelnummer)
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(row_to_artikel).transpose()
    }

    #[instrument(skip(self, artikel), fields(artikelnummer = %artikel.artikelnummer), err)]
    async fn insert(&self, artikel: &Artikel) -> Result<ArtikelId, StorageError> {
        insert_artikel(artikel, &*self.pool).await
    }

    #[instrument(skip(self, artikel), fields(artikelnummer = %artikel.artikelnummer), err)]
    async fn update(&self, artikel: &Artikel) -> Result<(), StorageError> {
        update_artikel(artikel, &*self.pool).await
    }

    #[instrument(skip(self, filter), err)]
    async fn search(&self, filter: &ArtikelFilter) -> Result<Vec<Artikel>, StorageError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {SELECT_COLUMNS} FROM artikel WHERE 1 = 1"));

        if let Some(bezeichnung) = &filter.bezeichnung {
            qb.push(" AND bezeichnung ILIKE ");
            qb.push_bind(format!("%{}%", escape_like(bezeichnung)));
        }
        if let Some(kategorie) = &filter.kategorie {
            qb.push(" AND kategorie = ");
            qb.push_bind(kategorie.clone());
        }
        if let Some(lieferant) = &filter.lieferant {
            qb.push(" AND lieferant = ");
            qb.push_bind(lieferant.clone());
        }
        if let Some(preis_min) = filter.preis_min {
            qb.push(" AND preis >= ");
            qb.push_bind(preis_min);
        }
        if let Some(preis_max) = filter.preis_max {
            qb.push(" AND preis <= ");
            qb.push_bind(preis_max);
        }
        if filter.nur_aktive {
            qb.push(" AND aktiv = TRUE");
        }

        qb.push(" ORDER BY bezeichnung ASC LIMIT ");
        qb.push_bind(filter.limit);
        qb.push(" OFFSET ");
        qb.push_bind(filter.offset);

        let rows = qb.build().fetch_all(&*self.pool).await?;
        rows.iter().map(row_to_artikel).collect()
    }

    async fn begin(&self) -> Result<Box<dyn ArtikelTx>, StorageError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgArtikelTx { tx }))
    }
}

async fn insert_artikel<'e, E>(artikel: &Artikel, executor: E) -> Result<ArtikelId, StorageError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO artikel (
            artikelnummer, bezeichnung, beschreibung, kategorie, lieferant,
            tags, dimension, gewicht, preis, waehrung, einheit,
            lagerbestand, min_bestand, max_bestand, aktiv, erstellt_am, geaendert_am
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING id
        "#,
    )
    .bind(&artikel.artikelnummer)
    .bind(&artikel.bezeichnung)
    .bind(&artikel.beschreibung)
    .bind(&artikel.kategorie)
    .bind(&artikel.lieferant)
    .bind(Json(&artikel.tags))
    .bind(Json(&artikel.dimension))
    .bind(artikel.gewicht)
    .bind(artikel.preis)
    .bind(&artikel.waehrung)
    .bind(&artikel.einheit)
    .bind(artikel.lagerbestand)
    .bind(artikel.min_bestand)
    .bind(artikel.max_bestand)
    .bind(artikel.aktiv)
    .bind(artikel.erstellt_am)
    .bind(artikel.geaendert_am)
    .fetch_one(executor)
    .await
    .map_err(|e| map_write_error(&artikel.artikelnummer, e))?;

    let id: uuid::Uuid = row.try_get("id")?;
    Ok(ArtikelId::from_uuid(id))
}

async fn update_artikel<'e, E>(artikel: &Artikel, executor: E) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let Some(id) = artikel.id else {
        return Err(StorageError::MissingRow(
            "update requires a persisted article (id is unset)".to_string(),
        ));
    };

    let result = sqlx::query(
        r#"
        UPDATE artikel SET
            artikelnummer = $2,
            bezeichnung = $3,
            beschreibung = $4,
            kategorie = $5,
            lieferant = $6,
            tags = $7,
            dimension = $8,
            gewicht = $9,
            preis = $10,
            waehrung = $11,
            einheit = $12,
            lagerbestand = $13,
            min_bestand = $14,
            max_bestand = $15,
            aktiv = $16,
            erstellt_am = $17,
            geaendert_am = $18
        WHERE id = $1
        "#,
    )
    .bind(id.as_uuid())
    .bind(&artikel.artikelnummer)
    .bind(&artikel.bezeichnung)
    .bind(&artikel.beschreibung)
    .bind(&artikel.kategorie)
    .bind(&artikel.lieferant)
    .bind(Json(&artikel.tags))
    .bind(Json(&artikel.dimension))
    .bind(artikel.gewicht)
    .bind(artikel.preis)
    .bind(&artikel.waehrung)
    .bind(&artikel.einheit)
    .bind(artikel.lagerbestand)
    .bind(artikel.min_bestand)
    .bind(artikel.max_bestand)
    .bind(artikel.aktiv)
    .bind(artikel.erstellt_am)
    .bind(artikel.geaendert_am)
    .execute(executor)
    .await
    .map_err(|e| map_write_error(&artikel.artikelnummer, e))?;

    if result.rows_affected() == 0 {
        return Err(StorageError::MissingRow(format!("artikel {id}")));
    }
    Ok(())
}

/// One open Postgres transaction.
struct PgArtikelTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ArtikelTx for PgArtikelTx {
    async fn insert(&mut self, artikel: &Artikel) -> Result<ArtikelId, StorageError> {
        insert_artikel(artikel, &mut *self.tx).await
    }

    async fn update(&mut self, artikel: &Artikel) -> Result<(), StorageError> {
        update_artikel(artikel, &mut *self.tx).await
    }

    async fn fetch_for_update(&mut self, id: ArtikelId) -> Result<Option<Artikel>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM artikel WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_artikel).transpose()
    }

    async fn set_lagerbestand(
        &mut self,
        id: ArtikelId,
        lagerbestand: i64,
        geaendert_am: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE artikel SET lagerbestand = $2, geaendert_am = $3 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(lagerbestand)
        .bind(geaendert_am)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::MissingRow(format!("artikel {id}")));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
