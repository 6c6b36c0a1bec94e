//! Error types for the source fetchers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level failure or a non-2xx status surfaced by `reqwest`.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The one-time login exchange for a token-authenticated source failed.
    /// This is fatal for the whole run: no page can be fetched without it.
    #[error("{retailer} login failed: {reason}")]
    Login { retailer: String, reason: String },

    /// A response body could not be parsed into the expected shape.
    #[error("failed to deserialize {context}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The source rejected the request to shed load (HTTP 429/503).
    #[error("rate limited by {domain} (HTTP {status})")]
    RateLimited { domain: String, status: u16 },

    /// Any other unexpected HTTP status.
    #[error("unexpected HTTP {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// A browser-automation step failed (launch, navigation, script).
    #[error("browser automation failed: {0}")]
    Browser(String),

    /// A raw listing is missing a field the canonical mapping requires.
    /// Affects that single record only; the run continues.
    #[error("cannot map listing {external_id}: {reason}")]
    Mapping { external_id: String, reason: String },
}
