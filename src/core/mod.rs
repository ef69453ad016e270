//! Core domain primitives shared by the retrieval loop.
//!
//! These types have no async or network dependencies: query text and its
//! script, tokenization and term overlap, and URL canonicalization. Every
//! scoring and dedup decision in [`crate::search`] reduces to the functions
//! here, which keeps them deterministic and cheap to test.

pub mod links;
pub mod query;
pub mod text;

pub use links::{canonicalize_url, domain_of};
pub use query::{Query, Script};
pub use text::{coverage, jaccard, salient_terms, tokenize};
