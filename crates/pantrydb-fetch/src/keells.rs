//! Fetcher for the Keells online-store API.
//!
//! Keells requires a guest-login exchange before the listing endpoint
//! answers: the login response carries a `userSessionID` plus a cookie set,
//! and every listing request must replay both. The session is established
//! lazily on first use and reused for the lifetime of the fetcher. Listing
//! pagination is driven by the `pageCount` value the API reports in each
//! response.

use std::time::Duration;

use async_trait::async_trait;
use pantrydb_core::{CanonicalProduct, SourceKind};
use reqwest::header::SET_COOKIE;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::FetchError;
use crate::{id_string, lenient_f64, non_empty_string, FetchParams, SourceFetcher};

const DEFAULT_BASE_URL: &str = "https://zebraliveback.keellssuper.com";
const DEFAULT_PAGE_SIZE: u32 = 50;

/// Session state from a successful guest login, reused across pages.
#[derive(Debug, Clone)]
struct KeellsSession {
    user_session_id: String,
    /// All login cookies folded into a single `Cookie` header value.
    cookies: String,
}

pub struct KeellsFetcher {
    client: Client,
    base_url: String,
    session: OnceCell<KeellsSession>,
}

impl KeellsFetcher {
    /// Creates a fetcher pointed at the production Keells API.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, FetchError> {
        Self::with_base_url(timeout_secs, user_agent, DEFAULT_BASE_URL)
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
            session: OnceCell::new(),
        })
    }

    /// Establishes the guest session exactly once; later calls reuse it.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Login`] if the exchange fails or the response
    /// carries no session id or cookies. Login failure is fatal for the
    /// whole run: nothing can be fetched without the session.
    async fn ensure_session(&self) -> Result<&KeellsSession, FetchError> {
        self.session.get_or_try_init(|| self.login()).await
    }

    async fn login(&self) -> Result<KeellsSession, FetchError> {
        let url = format!("{}/1.0/Login/GuestLogin", self.base_url);
        let response = self.client.post(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Login {
                retailer: "Keells".to_owned(),
                reason: format!("guest login returned HTTP {status}"),
            });
        }

        // Cookie values can themselves contain separators; keep only the
        // leading key=value pair of each Set-Cookie header.
        let cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|c| c.split(';').next())
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("; ");

        let body: Value = response.json().await?;
        let user_session_id = body
            .pointer("/result/userSessionID")
            .and_then(Value::as_str)
            .ok_or_else(|| FetchError::Login {
                retailer: "Keells".to_owned(),
                reason: "no userSessionID in login response".to_owned(),
            })?
            .to_owned();

        if cookies.is_empty() {
            return Err(FetchError::Login {
                retailer: "Keells".to_owned(),
                reason: "no session cookies returned".to_owned(),
            });
        }

        tracing::info!("Keells guest session established");
        Ok(KeellsSession {
            user_session_id,
            cookies,
        })
    }

    async fn fetch_page(
        &self,
        session: &KeellsSession,
        term: &str,
        page_no: u32,
        page_size: u32,
    ) -> Result<Value, FetchError> {
        let url = format!("{}/2.0/WebV2/GetItemDetails", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("pageNo", page_no.to_string().as_str()),
                ("itemsPerPage", page_size.to_string().as_str()),
                ("itemDescription", term),
                ("outletCode", "SCDR"),
                ("departmentId", ""),
                ("subDepartmentId", ""),
                ("categoryId", ""),
                ("itemPricefrom", "0"),
                ("itemPriceTo", "5000"),
                ("isFeatured", "0"),
                ("isPromotionOnly", "false"),
                ("promotionCategory", ""),
                ("sortBy", "default"),
                ("BrandId", ""),
                ("storeName", ""),
                ("subDeaprtmentCode", ""),
                ("isShowOutofStockItems", "true"),
                ("brandName", ""),
            ])
            .header("usersessionid", &session.user_session_id)
            .header("Accept", "application/json")
            .header("Cookie", &session.cookies)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Deserialize {
            context: format!("Keells GetItemDetails page {page_no}"),
            source: e,
        })
    }
}

#[async_trait]
impl SourceFetcher for KeellsFetcher {
    fn source_name(&self) -> &'static str {
        "Keells"
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

    /// Pages through `GetItemDetails` until the page count reported by the
    /// first response is reached (or the caller's page budget, if smaller).
    async fn fetch(&self, params: &FetchParams) -> Result<Vec<Value>, FetchError> {
        let session = self.ensure_session().await?;

        let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let mut all_items = Vec::new();
        let mut page_no = 1u32;
        let mut total_pages;

        loop {
            let body = self
                .fetch_page(session, params.term(), page_no, page_size)
                .await?;

            let items = body
                .pointer("/result/itemDetailResult/itemDetails")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            tracing::debug!(page_no, items = items.len(), "Keells page fetched");
            all_items.extend(items);

            total_pages = body
                .pointer("/result/itemDetailResult/pageCount")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(1)
                .max(1);
            if let Some(budget) = params.page_budget {
                total_pages = total_pages.min(budget);
            }

            page_no += 1;
            if page_no > total_pages {
                break;
            }
        }

        tracing::info!(total = all_items.len(), pages = total_pages, "Keells fetch complete");
        Ok(all_items)
    }

    fn map_to_canonical(
        &self,
        raw: &Value,
        placeholder_ingredient_id: i64,
    ) -> Result<CanonicalProduct, FetchError> {
        let external_id =
            id_string(raw.get("itemID")).ok_or_else(|| FetchError::Mapping {
                external_id: "<unknown>".to_owned(),
                reason: "Keells listing has no itemID".to_owned(),
            })?;
        let name = non_empty_string(raw.get("name")).ok_or_else(|| FetchError::Mapping {
            external_id: external_id.clone(),
            reason: "Keells listing has no name".to_owned(),
        })?;

        Ok(CanonicalProduct {
            external_id,
            name,
            unit: non_empty_string(raw.get("uom")).unwrap_or_else(|| "unit".to_owned()),
            quantity: lenient_f64(raw.get("minQty")).unwrap_or(1.0),
            price: lenient_f64(raw.get("amount")).unwrap_or(0.0),
            currency: "LKR".to_owned(),
            url: non_empty_string(raw.get("imageUrl")),
            department_code: None,
            item_code: id_string(raw.get("itemCode")),
            is_available: raw.get("isAvailable").and_then(Value::as_bool).unwrap_or(true),
            ingredient_id: placeholder_ingredient_id,
            raw: raw.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fetcher() -> KeellsFetcher {
        KeellsFetcher::with_base_url(30, "test-agent", "http://localhost:1")
            .expect("client construction should not fail")
    }

    #[test]
    fn maps_a_typical_listing() {
        let raw = json!({
            "itemID": 4711,
            "itemCode": "KI-4711",
            "name": "White Sugar 1kg",
            "uom": "EA",
            "minQty": "1",
            "amount": 450.0,
            "imageUrl": "https://cdn.keells.example/4711.jpg",
            "isAvailable": false,
        });
        let product = fetcher().map_to_canonical(&raw, 7).expect("mapping failed");
        assert_eq!(product.external_id, "4711");
        assert_eq!(product.name, "White Sugar 1kg");
        assert_eq!(product.unit, "EA");
        assert_eq!(product.price, 450.0);
        assert_eq!(product.item_code.as_deref(), Some("KI-4711"));
        assert!(!product.is_available);
        assert_eq!(product.ingredient_id, 7);
    }

    #[test]
    fn mapping_fails_without_item_id() {
        let raw = json!({"name": "Mystery"});
        let err = fetcher().map_to_canonical(&raw, 1).expect_err("expected Mapping");
        assert!(matches!(err, FetchError::Mapping { .. }));
    }

    #[test]
    fn mapping_defaults_unit_and_availability() {
        let raw = json!({"itemID": "9", "name": "Lime"});
        let product = fetcher().map_to_canonical(&raw, 1).expect("mapping failed");
        assert_eq!(product.unit, "unit");
        assert_eq!(product.quantity, 1.0);
        assert_eq!(product.price, 0.0);
        assert!(product.is_available);
    }
}
