//! Embedding-backed matching of free-text queries to catalog ingredients.
//!
//! Three pieces: a TEI-style embedding client, a Qdrant vector-store
//! client, and the [`IngredientMatcher`] that ties them to the Postgres
//! query-embedding cache. [`build_ingredient_index`] is the batch job that
//! populates the vector collection from the ingredient catalog.

mod embedder;
pub mod error;
pub mod index;
pub mod matcher;
mod vector_store;

pub use error::MatcherError;
pub use index::build_ingredient_index;
pub use matcher::{IngredientMatch, IngredientMatcher, MatchFilters, MatchResult};
