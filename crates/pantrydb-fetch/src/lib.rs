//! Source fetchers for retail product listings.
//!
//! Three retailers, three transport shapes: `Cargills` needs a scripted
//! browser session before its backend endpoint answers, `Keells` is a
//! token-authenticated paginated API behind a guest login, and `SPAR`
//! exposes a public paginated JSON feed. [`SourceFetcher`] is the common
//! capability; the orchestrator in the CLI picks an implementation by name
//! and drives it without caring which shape it is.

pub mod cargills;
pub mod error;
pub mod keells;
mod retry;
pub mod spar;

pub use cargills::CargillsFetcher;
pub use error::FetchError;
pub use keells::KeellsFetcher;
pub use spar::SparFetcher;

use async_trait::async_trait;
use pantrydb_core::{CanonicalProduct, SourceKind};
use serde_json::Value;

/// Parameters for one fetch pass against a source.
///
/// All fields are optional; each fetcher applies its own defaults where a
/// field does not apply to its transport (e.g. `page_budget` for a source
/// that reports its own page count).
#[derive(Debug, Clone, Default)]
pub struct FetchParams {
    /// Search term or term-alphabet letter; empty/absent means "everything".
    pub search_term: Option<String>,
    pub page_size: Option<u32>,
    /// Upper bound on pages fetched in one pass.
    pub page_budget: Option<u32>,
}

impl FetchParams {
    #[must_use]
    pub fn term(&self) -> &str {
        self.search_term.as_deref().unwrap_or("")
    }
}

/// A retail source the ingestion pipeline can pull listings from.
///
/// `fetch` never fails for "no results" — it returns an empty vector; it
/// returns an error only for transport-level faults that survive the
/// fetcher's own retry policy. `map_to_canonical` is pure per-record
/// translation; a failure there affects that record only.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// ISO 3166 country code the retailer operates in.
    fn country(&self) -> &'static str;

    fn kind(&self) -> SourceKind;

    /// Base endpoint the fetcher talks to, recorded on the source row.
    fn base_url(&self) -> &str;

    /// Pulls raw listings for the given parameters, in source order.
    async fn fetch(&self, params: &FetchParams) -> Result<Vec<Value>, FetchError>;

    /// Translates one raw listing into the canonical shape, assigning the
    /// placeholder ingredient. Quantity, unit, and price are refined again
    /// by the normalizer before storage.
    fn map_to_canonical(
        &self,
        raw: &Value,
        placeholder_ingredient_id: i64,
    ) -> Result<CanonicalProduct, FetchError>;
}

/// A source-side identifier that may arrive as a JSON number or string.
pub(crate) fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A string field, with empty strings treated as absent.
pub(crate) fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// A numeric field that may arrive as a JSON number or a numeric string.
pub(crate) fn lenient_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
