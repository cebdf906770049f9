//! Artikel domain module.
//!
//! This crate contains the business rules for the article master data record,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage).

pub mod artikel;
pub mod filter;

pub use artikel::{Artikel, ArtikelDraft, ArtikelId};
pub use filter::ArtikelFilter;
