use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stammdaten_core::{DomainError, DomainResult};

/// Artikel identifier. Assigned by storage on first persist; an `Artikel`
/// carries `None` until then.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtikelId(pub Uuid);

stammdaten_core::impl_uuid_newtype!(ArtikelId, "ArtikelId");

/// Article master data record.
///
/// Plain record with value semantics; the manager owns all persistence. serde
/// derives are the sole conversion boundary for cache storage and API
/// responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artikel {
    pub id: Option<ArtikelId>,
    /// Business key, unique across all articles.
    pub artikelnummer: String,
    pub bezeichnung: String,
    pub beschreibung: String,
    pub kategorie: String,
    pub lieferant: String,
    pub tags: BTreeSet<String>,
    pub dimension: BTreeMap<String, String>,
    pub gewicht: f64,
    pub preis: f64,
    /// ISO currency code.
    pub waehrung: String,
    /// Unit of measure.
    pub einheit: String,
    /// Current stock on hand. Never negative for a persisted article.
    pub lagerbestand: i64,
    pub min_bestand: i64,
    pub max_bestand: i64,
    /// Soft-delete flag.
    pub aktiv: bool,
    /// Set once on first persist.
    pub erstellt_am: DateTime<Utc>,
    /// Updated on every mutation.
    pub geaendert_am: DateTime<Utc>,
}

/// Partial input for constructing an [`Artikel`].
///
/// Every omitted field gets an explicit default:
///
/// | field | default |
/// |---|---|
/// | `id` | `None` (assigned by storage) |
/// | string fields | empty string |
/// | `tags` / `dimension` | empty containers |
/// | `gewicht` / `preis` | `0.0` |
/// | `waehrung` | `"EUR"` |
/// | `lagerbestand` / `min_bestand` / `max_bestand` | `0` |
/// | `aktiv` | `true` |
/// | `erstellt_am` / `geaendert_am` | now |
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtikelDraft {
    pub id: Option<ArtikelId>,
    pub artikelnummer: Option<String>,
    pub bezeichnung: Option<String>,
    pub beschreibung: Option<String>,
    pub kategorie: Option<String>,
    pub lieferant: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub dimension: Option<BTreeMap<String, String>>,
    pub gewicht: Option<f64>,
    pub preis: Option<f64>,
    pub waehrung: Option<String>,
    pub einheit: Option<String>,
    pub lagerbestand: Option<i64>,
    pub min_bestand: Option<i64>,
    pub max_bestand: Option<i64>,
    pub aktiv: Option<bool>,
    pub erstellt_am: Option<DateTime<Utc>>,
    pub geaendert_am: Option<DateTime<Utc>>,
}

impl Artikel {
    /// Construct an article from partial input, applying the documented
    /// defaults for every omitted field.
    pub fn from_draft(draft: ArtikelDraft) -> Self {
        let now = Utc::now();
        Self {
            id: draft.id,
            artikelnummer: draft.artikelnummer.unwrap_or_default(),
            bezeichnung: draft.bezeichnung.unwrap_or_default(),
            beschreibung: draft.beschreibung.unwrap_or_default(),
            kategorie: draft.kategorie.unwrap_or_default(),
            lieferant: draft.lieferant.unwrap_or_default(),
            tags: draft.tags.unwrap_or_default(),
            dimension: draft.dimension.unwrap_or_default(),
            gewicht: draft.gewicht.unwrap_or(0.0),
            preis: draft.preis.unwrap_or(0.0),
            waehrung: draft.waehrung.unwrap_or_else(|| "EUR".to_string()),
            einheit: draft.einheit.unwrap_or_default(),
            lagerbestand: draft.lagerbestand.unwrap_or(0),
            min_bestand: draft.min_bestand.unwrap_or(0),
            max_bestand: draft.max_bestand.unwrap_or(0),
            aktiv: draft.aktiv.unwrap_or(true),
            erstellt_am: draft.erstellt_am.unwrap_or(now),
            geaendert_am: draft.geaendert_am.unwrap_or(now),
        }
    }

    /// Check the article invariants. Called by the manager before every
    /// persist; an article never reaches storage in an invalid state.
    pub fn validate(&self) -> DomainResult<()> {
        if self.artikelnummer.trim().is_empty() {
            return Err(DomainError::validation("artikelnummer cannot be empty"));
        }
        if self.bezeichnung.trim().is_empty() {
            return Err(DomainError::validation("bezeichnung cannot be empty"));
        }
        if self.preis < 0.0 {
            return Err(DomainError::validation(format!(
                "preis must not be negative, got {}",
                self.preis
            )));
        }
        if self.lagerbestand < 0 {
            return Err(DomainError::validation(format!(
                "lagerbestand must not be negative, got {}",
                self.lagerbestand
            )));
        }
        if self.min_bestand > self.max_bestand {
            return Err(DomainError::validation(format!(
                "min_bestand {} exceeds max_bestand {}",
                self.min_bestand, self.max_bestand
            )));
        }
        Ok(())
    }

    /// Stock has fallen below the configured reorder threshold.
    pub fn unter_mindestbestand(&self) -> bool {
        self.lagerbestand < self.min_bestand
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_artikel() -> Artikel {
        Artikel::from_draft(ArtikelDraft {
            artikelnummer: Some("A-1".to_string()),
            bezeichnung: Some("Test".to_string()),
            preis: Some(10.0),
            lagerbestand: Some(5),
            max_bestand: Some(100),
            ..ArtikelDraft::default()
        })
    }

    #[test]
    fn from_draft_applies_defaults() {
        let artikel = Artikel::from_draft(ArtikelDraft::default());

        assert_eq!(artikel.id, None);
        assert_eq!(artikel.artikelnummer, "");
        assert_eq!(artikel.bezeichnung, "");
        assert_eq!(artikel.waehrung, "EUR");
        assert_eq!(artikel.preis, 0.0);
        assert_eq!(artikel.lagerbestand, 0);
        assert!(artikel.aktiv);
        assert!(artikel.tags.is_empty());
        assert!(artikel.dimension.is_empty());
        assert_eq!(artikel.erstellt_am, artikel.geaendert_am);
    }

    #[test]
    fn from_draft_keeps_provided_values() {
        let mut tags = BTreeSet::new();
        tags.insert("neu".to_string());

        let artikel = Artikel::from_draft(ArtikelDraft {
            artikelnummer: Some("A-42".to_string()),
            bezeichnung: Some("Schraube M4".to_string()),
            kategorie: Some("Befestigung".to_string()),
            tags: Some(tags.clone()),
            preis: Some(0.12),
            waehrung: Some("CHF".to_string()),
            aktiv: Some(false),
            ..ArtikelDraft::default()
        });

        assert_eq!(artikel.artikelnummer, "A-42");
        assert_eq!(artikel.bezeichnung, "Schraube M4");
        assert_eq!(artikel.kategorie, "Befestigung");
        assert_eq!(artikel.tags, tags);
        assert_eq!(artikel.waehrung, "CHF");
        assert!(!artikel.aktiv);
    }

    #[test]
    fn validate_accepts_valid_artikel() {
        assert!(valid_artikel().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_artikelnummer() {
        let mut artikel = valid_artikel();
        artikel.artikelnummer = "   ".to_string();

        let err = artikel.validate().unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("artikelnummer")),
            _ => panic!("Expected Validation error for empty artikelnummer"),
        }
    }

    #[test]
    fn validate_rejects_empty_bezeichnung() {
        let mut artikel = valid_artikel();
        artikel.bezeichnung = String::new();

        let err = artikel.validate().unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("bezeichnung")),
            _ => panic!("Expected Validation error for empty bezeichnung"),
        }
    }

    #[test]
    fn validate_rejects_negative_preis() {
        let mut artikel = valid_artikel();
        artikel.preis = -0.01;

        let err = artikel.validate().unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("preis")),
            _ => panic!("Expected Validation error for negative preis"),
        }
    }

    #[test]
    fn validate_rejects_negative_lagerbestand() {
        let mut artikel = valid_artikel();
        artikel.lagerbestand = -1;

        let err = artikel.validate().unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("lagerbestand")),
            _ => panic!("Expected Validation error for negative lagerbestand"),
        }
    }

    #[test]
    fn validate_rejects_min_bestand_above_max_bestand() {
        let mut artikel = valid_artikel();
        artikel.min_bestand = 50;
        artikel.max_bestand = 10;

        let err = artikel.validate().unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("min_bestand")),
            _ => panic!("Expected Validation error for min_bestand > max_bestand"),
        }
    }

    #[test]
    fn unter_mindestbestand_compares_against_threshold() {
        let mut artikel = valid_artikel();
        artikel.min_bestand = 10;
        artikel.max_bestand = 100;

        artikel.lagerbestand = 9;
        assert!(artikel.unter_mindestbestand());

        artikel.lagerbestand = 10;
        assert!(!artikel.unter_mindestbestand());
    }

    #[test]
    fn serde_round_trips_through_json() {
        let artikel = valid_artikel();

        let json = serde_json::to_string(&artikel).unwrap();
        let back: Artikel = serde_json::from_str(&json).unwrap();

        assert_eq!(artikel, back);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: any draft with non-empty keys, non-negative numerics
            /// and ordered bounds produces a valid article.
            #[test]
            fn well_formed_drafts_validate(
                artikelnummer in "[A-Z0-9-]{1,20}",
                bezeichnung in "[A-Za-z][A-Za-z0-9 ]{0,99}",
                preis in 0.0f64..1_000_000.0,
                lagerbestand in 0i64..1_000_000,
                min_bestand in 0i64..1000,
                spanne in 0i64..1000,
            ) {
                let artikel = Artikel::from_draft(ArtikelDraft {
                    artikelnummer: Some(artikelnummer),
                    bezeichnung: Some(bezeichnung),
                    preis: Some(preis),
                    lagerbestand: Some(lagerbestand),
                    min_bestand: Some(min_bestand),
                    max_bestand: Some(min_bestand + spanne),
                    ..ArtikelDraft::default()
                });

                prop_assert!(artikel.validate().is_ok());
            }

            /// Property: a negative price is always rejected, whatever the
            /// rest of the record looks like.
            #[test]
            fn negative_preis_is_always_rejected(
                artikelnummer in "[A-Z0-9-]{1,20}",
                bezeichnung in "[A-Za-z][A-Za-z0-9 ]{0,99}",
                preis in -1_000_000.0f64..-0.000_001,
            ) {
                let artikel = Artikel::from_draft(ArtikelDraft {
                    artikelnummer: Some(artikelnummer),
                    bezeichnung: Some(bezeichnung),
                    preis: Some(preis),
                    ..ArtikelDraft::default()
                });

                prop_assert!(matches!(
                    artikel.validate(),
                    Err(DomainError::Validation(_))
                ));
            }

            /// Property: crossed stock bounds are always rejected.
            #[test]
            fn crossed_bestand_bounds_are_always_rejected(
                artikelnummer in "[A-Z0-9-]{1,20}",
                bezeichnung in "[A-Za-z][A-Za-z0-9 ]{0,99}",
                max_bestand in 0i64..1000,
                abstand in 1i64..1000,
            ) {
                let artikel = Artikel::from_draft(ArtikelDraft {
                    artikelnummer: Some(artikelnummer),
                    bezeichnung: Some(bezeichnung),
                    min_bestand: Some(max_bestand + abstand),
                    max_bestand: Some(max_bestand),
                    ..ArtikelDraft::default()
                });

                prop_assert!(matches!(
                    artikel.validate(),
                    Err(DomainError::Validation(_))
                ));
            }
        }
    }
}
