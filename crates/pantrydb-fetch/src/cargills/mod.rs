//! Fetcher for the Cargills online storefront.
//!
//! Cargills' listing endpoint only answers for clients that have been
//! through the storefront's client-side gate: an age interstitial and a
//! delivery-location form, both rendered in the browser. The fetcher runs
//! that script in a headless browser, harvests the cookies the site sets,
//! and then calls the backend listing endpoint directly over plain HTTP
//! with those cookies replayed.

mod browser;

use std::time::Duration;

use async_trait::async_trait;
use pantrydb_core::{normalize_price, CanonicalProduct, SourceKind};
use reqwest::Client;
use serde_json::{json, Value};

use crate::cargills::browser::BrowserSession;
use crate::error::FetchError;
use crate::{id_string, lenient_f64, non_empty_string, FetchParams, SourceFetcher};

const DEFAULT_BASE_URL: &str = "https://cargillsonline.com";
/// Opaque filter token the storefront sends with every listing request.
const FILTER_TOKEN: &str = "Wwzpa2LygAJqAK1uM94i8A==";
/// The storefront rejects obviously non-browser user agents.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";
const DEFAULT_PAGE_SIZE: u32 = 10_000;

/// Clicks the age-gate button if the interstitial is showing.
const DISMISS_AGE_GATE_JS: &str = r#"
(() => {
  const btn = [...document.querySelectorAll('button, a')]
    .find(el => el.textContent.trim() === 'I am 21+');
  if (!btn) return false;
  btn.click();
  return true;
})()
"#;

/// Fills the delivery-location form with Colombo and submits it.
const SUBMIT_PINCODE_JS: &str = r#"
(() => {
  const input = document.querySelector('input[name="pincode"]');
  if (!input) return false;
  input.value = 'Colombo';
  input.dispatchEvent(new Event('input', { bubbles: true }));
  const btn = [...document.querySelectorAll('button')]
    .find(el => el.textContent.trim() === 'Submit');
  if (btn) btn.click();
  return true;
})()
"#;

pub struct CargillsFetcher {
    client: Client,
    base_url: String,
}

impl CargillsFetcher {
    /// Creates a fetcher pointed at the production Cargills storefront.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(timeout_secs: u64) -> Result<Self, FetchError> {
        Self::with_base_url(timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a fetcher with a custom base URL.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn with_base_url(timeout_secs: u64, base_url: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn fetch_with_session(
        &self,
        session: &BrowserSession,
        params: &FetchParams,
    ) -> Result<Vec<Value>, FetchError> {
        if session.eval_bool(DISMISS_AGE_GATE_JS).await? {
            tracing::debug!("age interstitial dismissed");
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        if session.eval_bool(SUBMIT_PINCODE_JS).await? {
            tracing::debug!("delivery location submitted");
            // give the server a moment to set session cookies
            tokio::time::sleep(Duration::from_millis(1_000)).await;
        }

        let cookies = session.cookie_header().await?;

        let body = json!({
            "CategoryId": "",
            "Search": params.term(),
            "Filter": FILTER_TOKEN,
            "PageIndex": 1,
            "PageSize": params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            "BannerId": "",
            "SectionId": "",
            "CollectionId": "",
            "SectionType": "",
            "DataType": "",
            "SubCatId": "-1",
            "PromoId": "",
        });

        let url = format!("{}/Web/GetMenuCategoryItemsPagingV3/", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("Accept", "application/json, text/plain, */*")
            .header("Origin", &self.base_url)
            .header("Referer", &self.base_url)
            .json(&body);
        if !cookies.is_empty() {
            request = request.header("Cookie", cookies);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let text = response.text().await?;
        parse_listing_body(&text)
    }
}

/// Splits a listing response into items, tolerating the endpoint's shape
/// drift: sometimes a bare array, sometimes an object with an `Items`
/// field, and a one-element "No Products Found" array for zero results.
/// An unparsable body is a failure, not an empty result.
fn parse_listing_body(text: &str) -> Result<Vec<Value>, FetchError> {
    let data: Value = serde_json::from_str(text).map_err(|e| FetchError::Deserialize {
        context: "Cargills listing response".to_owned(),
        source: e,
    })?;

    match data {
        Value::Array(items) => {
            let no_products = items.len() == 1
                && items[0].get("ItemName").and_then(Value::as_str) == Some("No Products Found");
            if no_products {
                tracing::warn!("Cargills returned 'No Products Found'");
                return Ok(Vec::new());
            }
            Ok(items)
        }
        Value::Object(ref obj) => match obj.get("Items").and_then(Value::as_array) {
            Some(items) => Ok(items.clone()),
            None => {
                let keys: Vec<&String> = obj.keys().collect();
                tracing::warn!(?keys, "no 'Items' key in Cargills response");
                Ok(Vec::new())
            }
        },
        other => {
            tracing::warn!(body = %other, "unexpected Cargills response shape");
            Ok(Vec::new())
        }
    }
}

#[async_trait]
impl SourceFetcher for CargillsFetcher {
    fn source_name(&self) -> &'static str {
        "Cargills"
    }

    fn country(&self) -> &'static str {
        "LK"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Scraper
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Runs the full session script in a fresh headless browser, then calls
    /// the listing endpoint once with a large page size. The browser is
    /// released whether or not the listing call succeeds.
    async fn fetch(&self, params: &FetchParams) -> Result<Vec<Value>, FetchError> {
        tracing::debug!(term = params.term(), "launching headless browser");
        let session = BrowserSession::launch(&self.base_url).await?;
        let result = self.fetch_with_session(&session, params).await;
        session.close().await;

        if let Ok(items) = &result {
            tracing::info!(term = params.term(), total = items.len(), "Cargills fetch complete");
        }
        result
    }

    fn map_to_canonical(
        &self,
        raw: &Value,
        placeholder_ingredient_id: i64,
    ) -> Result<CanonicalProduct, FetchError> {
        let external_id = id_string(raw.get("SKUCODE")).ok_or_else(|| FetchError::Mapping {
            external_id: "<unknown>".to_owned(),
            reason: "Cargills listing has no SKUCODE".to_owned(),
        })?;
        let name = non_empty_string(raw.get("ItemName")).ok_or_else(|| FetchError::Mapping {
            external_id: external_id.clone(),
            reason: "Cargills listing has no ItemName".to_owned(),
        })?;

        Ok(CanonicalProduct {
            external_id: external_id.clone(),
            name,
            unit: non_empty_string(raw.get("UOM")).unwrap_or_default(),
            quantity: lenient_f64(raw.get("UnitSize")).unwrap_or(1.0),
            price: raw.get("Price").map_or(0.0, normalize_price),
            currency: "LKR".to_owned(),
            url: non_empty_string(raw.get("ItemImage")),
            department_code: non_empty_string(raw.get("CategoryCode")),
            item_code: Some(external_id),
            is_available: lenient_f64(raw.get("Inventory")).is_some_and(|n| n > 0.0),
            ingredient_id: placeholder_ingredient_id,
            raw: raw.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fetcher() -> CargillsFetcher {
        CargillsFetcher::with_base_url(30, "http://localhost:1")
            .expect("client construction should not fail")
    }

    #[test]
    fn parses_bare_array_response() {
        let items = parse_listing_body(r#"[{"ItemName": "Dhal 1kg"}]"#).expect("parse failed");
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn no_products_sentinel_is_empty_not_error() {
        let items = parse_listing_body(r#"[{"ItemName": "No Products Found"}]"#)
            .expect("sentinel should parse");
        assert!(items.is_empty());
    }

    #[test]
    fn parses_items_object_response() {
        let items = parse_listing_body(r#"{"Items": [{"ItemName": "a"}, {"ItemName": "b"}]}"#)
            .expect("parse failed");
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn object_without_items_is_empty() {
        let items = parse_listing_body(r#"{"Message": "session expired"}"#).expect("parse failed");
        assert!(items.is_empty());
    }

    #[test]
    fn unparsable_body_is_an_error() {
        let err = parse_listing_body("<html>blocked</html>").expect_err("expected Deserialize");
        assert!(matches!(err, FetchError::Deserialize { .. }));
    }

    #[test]
    fn maps_a_typical_listing() {
        let raw = json!({
            "ItemName": "Cargills Fresh Milk 1l",
            "SKUCODE": "CF-1001",
            "UOM": "ML",
            "UnitSize": 1000,
            "Price": "Rs. 540.00",
            "ItemImage": "https://cdn.cargills.example/milk.jpg",
            "Inventory": 12,
            "CategoryCode": "DAIRY",
        });
        let product = fetcher().map_to_canonical(&raw, 5).expect("mapping failed");
        assert_eq!(product.external_id, "CF-1001");
        assert_eq!(product.price, 540.0);
        assert_eq!(product.item_code.as_deref(), Some("CF-1001"));
        assert_eq!(product.department_code.as_deref(), Some("DAIRY"));
        assert!(product.is_available);
    }

    #[test]
    fn zero_inventory_is_unavailable() {
        let raw = json!({"ItemName": "Ghee", "SKUCODE": "G-1", "Inventory": 0});
        let product = fetcher().map_to_canonical(&raw, 1).expect("mapping failed");
        assert!(!product.is_available);
    }
}
