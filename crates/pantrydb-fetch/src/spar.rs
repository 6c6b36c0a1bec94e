//! Fetcher for the public SPAR product feed.
//!
//! No authentication: `products.json` is paged with `limit`/`page` query
//! parameters. The feed does rate-limit aggressive clients, so each page is
//! retried with exponential back-off on 429/503 and abandoned (not the run)
//! once the attempt cap is hit, and a fixed pacing delay is inserted
//! between pages.

use std::time::Duration;

use async_trait::async_trait;
use pantrydb_core::{normalize_price, CanonicalProduct, SourceKind};
use reqwest::Client;
use serde_json::Value;

use crate::error::FetchError;
use crate::retry::retry_with_backoff;
use crate::{id_string, lenient_f64, non_empty_string, FetchParams, SourceFetcher};

const DEFAULT_BASE_URL: &str = "https://spar2u.lk";
const DEFAULT_PAGE_SIZE: u32 = 25;
/// The feed is ~116 pages at the default page size; go slightly over.
const DEFAULT_PAGE_BUDGET: u32 = 120;

pub struct SparFetcher {
    client: Client,
    base_url: String,
    /// Retries per page on top of the first attempt; a page that still
    /// fails is skipped, not the run.
    max_retries: u32,
    backoff_base_ms: u64,
    page_delay_ms: u64,
}

impl SparFetcher {
    /// Creates a fetcher pointed at the production SPAR feed.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_ms: u64,
        page_delay_ms: u64,
    ) -> Result<Self, FetchError> {
        Self::with_base_url(
            timeout_secs,
            user_agent,
            max_retries,
            backoff_base_ms,
            page_delay_ms,
            DEFAULT_BASE_URL,
        )
    }

    /// Creates a fetcher with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn with_base_url(
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_ms: u64,
        page_delay_ms: u64,
        base_url: &str,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            max_retries,
            backoff_base_ms,
            page_delay_ms,
        })
    }

    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Vec<Value>, FetchError> {
        let url = format!(
            "{}/products.json?limit={page_size}&page={page}",
            self.base_url
        );
        let response = self.client.get(&url).send().await?;

        let status = response.status().as_u16();
        if status == 429 || status == 503 {
            return Err(FetchError::RateLimited {
                domain: self.base_url.clone(),
                status,
            });
        }
        if !response.status().is_success() {
            return Err(FetchError::UnexpectedStatus { status, url });
        }

        let body = response.text().await?;
        let json: Value = serde_json::from_str(&body).map_err(|e| FetchError::Deserialize {
            context: format!("SPAR products.json page {page}"),
            source: e,
        })?;
        Ok(json
            .get("products")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl SourceFetcher for SparFetcher {
    fn source_name(&self) -> &'static str {
        "SPAR"
    }

    fn country(&self) -> &'static str {
        "LK"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Walks the feed page by page up to the budget, stopping early at the
    /// first empty page. A page whose retries are exhausted is skipped with
    /// a warning; the run itself keeps going.
    async fn fetch(&self, params: &FetchParams) -> Result<Vec<Value>, FetchError> {
        let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let budget = params.page_budget.unwrap_or(DEFAULT_PAGE_BUDGET);

        let mut all_items = Vec::new();
        for page in 1..=budget {
            let result = retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
                self.fetch_page(page, page_size)
            })
            .await;

            match result {
                Ok(products) => {
                    if products.is_empty() {
                        tracing::info!(page, "SPAR feed exhausted — stopping early");
                        break;
                    }
                    tracing::debug!(page, items = products.len(), "SPAR page fetched");
                    all_items.extend(products);
                }
                Err(err) => {
                    tracing::warn!(page, error = %err, "skipping SPAR page");
                }
            }

            if self.page_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.page_delay_ms)).await;
            }
        }

        tracing::info!(total = all_items.len(), "SPAR fetch complete");
        Ok(all_items)
    }

    fn map_to_canonical(
        &self,
        raw: &Value,
        placeholder_ingredient_id: i64,
    ) -> Result<CanonicalProduct, FetchError> {
        let external_id = id_string(raw.get("id")).ok_or_else(|| FetchError::Mapping {
            external_id: "<unknown>".to_owned(),
            reason: "SPAR listing has no id".to_owned(),
        })?;
        let name = non_empty_string(raw.get("title")).ok_or_else(|| FetchError::Mapping {
            external_id: external_id.clone(),
            reason: "SPAR listing has no title".to_owned(),
        })?;

        // Price comes from the first in-stock variant, falling back to the
        // first variant of any kind.
        let variants = raw.get("variants").and_then(Value::as_array);
        let variant = variants.and_then(|vs| {
            vs.iter()
                .find(|v| v.get("available").and_then(Value::as_bool) == Some(true))
                .or_else(|| vs.first())
        });

        let url = raw
            .pointer("/images/0/src")
            .and_then(Value::as_str)
            .map(str::to_owned);

        Ok(CanonicalProduct {
            external_id,
            name,
            unit: non_empty_string(raw.get("unit")).unwrap_or_default(),
            quantity: lenient_f64(raw.get("quantity")).unwrap_or(1.0),
            price: variant
                .and_then(|v| v.get("price"))
                .map_or(0.0, normalize_price),
            currency: "LKR".to_owned(),
            url,
            department_code: Some(
                non_empty_string(raw.get("product_type")).unwrap_or_else(|| "Misc".to_owned()),
            ),
            item_code: variant.and_then(|v| id_string(v.get("sku"))),
            is_available: variant
                .and_then(|v| v.get("available"))
                .and_then(Value::as_bool)
                .unwrap_or(true),
            ingredient_id: placeholder_ingredient_id,
            raw: raw.clone(),
        })
    }
}
