use serde::{Deserialize, Serialize};

/// Search criteria for articles.
///
/// Set fields are combined conjunctively; unset fields do not constrain the
/// result. Results are always ordered by `bezeichnung` ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtikelFilter {
    /// Substring match on `bezeichnung`.
    pub bezeichnung: Option<String>,
    /// Exact match on `kategorie`.
    pub kategorie: Option<String>,
    /// Exact match on `lieferant`.
    pub lieferant: Option<String>,
    /// Inclusive lower price bound.
    pub preis_min: Option<f64>,
    /// Inclusive upper price bound.
    pub preis_max: Option<f64>,
    /// Restrict to active articles. Defaults to `true`.
    pub nur_aktive: bool,
    /// Page size. Defaults to 100.
    pub limit: i64,
    /// Page start. Defaults to 0.
    pub offset: i64,
}

impl Default for ArtikelFilter {
    fn default() -> Self {
        Self {
            bezeichnung: None,
            kategorie: None,
            lieferant: None,
            preis_min: None,
            preis_max: None,
            nur_aktive: true,
            limit: 100,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_targets_active_articles_first_page() {
        let filter = ArtikelFilter::default();

        assert!(filter.nur_aktive);
        assert_eq!(filter.limit, 100);
        assert_eq!(filter.offset, 0);
        assert_eq!(filter.bezeichnung, None);
        assert_eq!(filter.kategorie, None);
        assert_eq!(filter.lieferant, None);
        assert_eq!(filter.preis_min, None);
        assert_eq!(filter.preis_max, None);
    }
}
