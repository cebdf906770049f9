//! `stammdaten-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};

// Re-exported for the `impl_uuid_newtype!` macro expansion.
pub use uuid;
