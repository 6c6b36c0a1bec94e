//! Ingestion command handler.
//!
//! Drives one fetch pass against a retail source and lands the results in
//! the catalog with a single batched upsert. Per-record mapping failures
//! are logged and skipped rather than propagated so one malformed listing
//! does not abort the full run.

use std::collections::HashMap;

use pantrydb_core::{normalize_price, normalize_quantity_unit, AppConfig, CanonicalProduct};
use pantrydb_fetch::{
    CargillsFetcher, FetchParams, KeellsFetcher, SourceFetcher, SparFetcher,
};
use serde_json::Value;

/// Fetch, normalize, dedupe, and upsert listings for one source.
///
/// With `all` set, sweeps the source letter by letter instead of issuing a
/// single term query; a letter that fails is logged and the sweep
/// continues. A pass that yields no listings is a no-op, not an error.
///
/// # Errors
///
/// Returns an error for an unknown source name, a failed single-term
/// fetch, or a database failure. Per-record and per-letter failures are
/// logged and skipped.
pub(crate) async fn run_ingest(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    source: &str,
    term: Option<&str>,
    all: bool,
    page_size: Option<u32>,
    page_budget: Option<u32>,
) -> anyhow::Result<()> {
    let fetcher = build_fetcher(config, source)?;
    let placeholder_id = pantrydb_db::placeholder_ingredient_id(pool).await?;

    let raws = if all {
        fetch_alphabet(fetcher.as_ref(), config, page_size, page_budget).await
    } else {
        let params = FetchParams {
            search_term: term.map(str::to_owned),
            page_size,
            page_budget,
        };
        fetcher.fetch(&params).await?
    };

    if raws.is_empty() {
        tracing::info!(
            source = fetcher.source_name(),
            "no listings fetched; nothing to upsert"
        );
        return Ok(());
    }

    let fetched = raws.len();
    let prepared = prepare_products(fetcher.as_ref(), &raws, placeholder_id);
    let products = dedup_by_external_id(prepared);
    if products.is_empty() {
        tracing::warn!(
            source = fetcher.source_name(),
            fetched,
            "every fetched listing failed to map; nothing to upsert"
        );
        return Ok(());
    }

    let source_id = pantrydb_db::get_or_create_source(
        pool,
        fetcher.source_name(),
        fetcher.country(),
        fetcher.kind().as_str(),
        fetcher.base_url(),
    )
    .await?;
    let stats = pantrydb_db::bulk_upsert_products(pool, source_id, &products).await?;
    pantrydb_db::touch_last_fetch(pool, source_id).await?;

    println!(
        "{}: {} inserted, {} updated ({} listings fetched)",
        fetcher.source_name(),
        stats.inserted,
        stats.updated,
        fetched
    );
    Ok(())
}

fn build_fetcher(config: &AppConfig, source: &str) -> anyhow::Result<Box<dyn SourceFetcher>> {
    let fetcher: Box<dyn SourceFetcher> = match source.to_ascii_lowercase().as_str() {
        "cargills" => Box::new(CargillsFetcher::new(config.fetch_request_timeout_secs)?),
        "keells" => Box::new(KeellsFetcher::new(
            config.fetch_request_timeout_secs,
            &config.fetch_user_agent,
        )?),
        "spar" => Box::new(SparFetcher::new(
            config.fetch_request_timeout_secs,
            &config.fetch_user_agent,
            config.fetch_max_retries,
            config.fetch_backoff_base_ms,
            config.fetch_page_delay_ms,
        )?),
        other => anyhow::bail!("unknown source '{other}'; expected cargills, keells, or spar"),
    };
    Ok(fetcher)
}

/// Sweep the source with one fetch per letter of the alphabet, pausing
/// between letters. Letters that fail are logged and skipped.
async fn fetch_alphabet(
    fetcher: &dyn SourceFetcher,
    config: &AppConfig,
    page_size: Option<u32>,
    page_budget: Option<u32>,
) -> Vec<Value> {
    let mut raws = Vec::new();
    for letter in 'a'..='z' {
        let params = FetchParams {
            search_term: Some(letter.to_string()),
            page_size,
            page_budget,
        };
        match fetcher.fetch(&params).await {
            Ok(mut page) => {
                tracing::debug!(
                    source = fetcher.source_name(),
                    letter = %letter,
                    listings = page.len(),
                    "letter fetched"
                );
                raws.append(&mut page);
            }
            Err(e) => {
                tracing::warn!(
                    source = fetcher.source_name(),
                    letter = %letter,
                    error = %e,
                    "letter fetch failed; continuing sweep"
                );
            }
        }
        if letter != 'z' && config.ingest_inter_term_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(
                config.ingest_inter_term_delay_ms,
            ))
            .await;
        }
    }
    raws
}

/// Map raw listings to canonical products and refine them with the name
/// normalizer. The normalizer's quantity and unit replace whatever the
/// mapper derived, and a raw `Price` field replaces the mapped price.
/// Records that fail to map or normalize are logged and dropped.
fn prepare_products(
    fetcher: &dyn SourceFetcher,
    raws: &[Value],
    placeholder_ingredient_id: i64,
) -> Vec<CanonicalProduct> {
    let mut products = Vec::with_capacity(raws.len());
    for raw in raws {
        let mut product = match fetcher.map_to_canonical(raw, placeholder_ingredient_id) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(
                    source = fetcher.source_name(),
                    error = %e,
                    "skipping listing that failed to map"
                );
                continue;
            }
        };

        match normalize_quantity_unit(raw) {
            Ok(qu) => {
                product.quantity = qu.quantity;
                product.unit = qu.unit;
            }
            Err(e) => {
                tracing::warn!(
                    source = fetcher.source_name(),
                    external_id = %product.external_id,
                    error = %e,
                    "skipping listing that failed to normalize"
                );
                continue;
            }
        }

        if let Some(price) = raw.get("Price") {
            product.price = normalize_price(price);
        }

        products.push(product);
    }
    products
}

/// Collapse duplicate external ids within one batch, keeping the last
/// occurrence. The batched upsert requires distinct keys per statement.
fn dedup_by_external_id(products: Vec<CanonicalProduct>) -> Vec<CanonicalProduct> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(products.len());
    let mut out: Vec<CanonicalProduct> = Vec::with_capacity(products.len());
    for product in products {
        if let Some(&i) = index.get(&product.external_id) {
            out[i] = product;
        } else {
            index.insert(product.external_id.clone(), out.len());
            out.push(product);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn keells() -> KeellsFetcher {
        KeellsFetcher::new(5, "pantrydb-test").expect("client construction failed")
    }

    fn make_product(external_id: &str, price: f64) -> CanonicalProduct {
        CanonicalProduct {
            external_id: external_id.to_string(),
            name: "White Sugar 1kg".to_string(),
            unit: "g".to_string(),
            quantity: 1000.0,
            price,
            currency: "LKR".to_string(),
            url: None,
            department_code: None,
            item_code: None,
            is_available: true,
            ingredient_id: 1,
            raw: json!({}),
        }
    }

    #[test]
    fn prepare_refines_quantity_and_unit_from_the_name() {
        let fetcher = keells();
        let raws = vec![json!({
            "itemID": 4711,
            "name": "White Sugar 1kg",
            "uom": "EA",
            "minQty": 1,
            "amount": 250.0,
        })];

        let products = prepare_products(&fetcher, &raws, 1);

        assert_eq!(products.len(), 1);
        assert_eq!(products[0].external_id, "4711");
        assert_eq!(products[0].quantity, 1000.0);
        assert_eq!(products[0].unit, "g");
        assert_eq!(products[0].price, 250.0);
        assert_eq!(products[0].ingredient_id, 1);
    }

    #[test]
    fn prepare_skips_records_that_fail_to_map() {
        let fetcher = keells();
        let raws = vec![
            json!({"name": "No id here", "amount": 10.0}),
            json!({"itemID": 7, "name": "Red Lentils 500g", "amount": 380.0}),
        ];

        let products = prepare_products(&fetcher, &raws, 1);

        assert_eq!(products.len(), 1);
        assert_eq!(products[0].external_id, "7");
        assert_eq!(products[0].quantity, 500.0);
        assert_eq!(products[0].unit, "g");
    }

    #[test]
    fn raw_price_field_replaces_the_mapped_price() {
        let fetcher = keells();
        let raws = vec![json!({
            "itemID": 9,
            "name": "Coconut Milk 400ml",
            "amount": 100.0,
            "Price": "Rs. 1,250.00",
        })];

        let products = prepare_products(&fetcher, &raws, 1);

        assert_eq!(products.len(), 1);
        assert_eq!(products[0].price, 1250.0);
    }

    #[test]
    fn dedup_keeps_the_last_occurrence() {
        let products = vec![
            make_product("a", 100.0),
            make_product("b", 200.0),
            make_product("a", 150.0),
        ];

        let deduped = dedup_by_external_id(products);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].external_id, "a");
        assert_eq!(deduped[0].price, 150.0);
        assert_eq!(deduped[1].external_id, "b");
    }
}
