//! Database operations for the `products` table.
//!
//! The whole ingestion batch lands in one `INSERT ... SELECT UNNEST(...)`
//! statement so a run is a single round-trip regardless of batch size.

use chrono::{DateTime, Utc};
use pantrydb_core::CanonicalProduct;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub source_id: i64,
    pub external_id: String,
    pub ingredient_id: i64,
    pub name: String,
    pub unit: String,
    pub quantity: f64,
    pub price: f64,
    pub currency: String,
    pub url: Option<String>,
    pub department_code: Option<String>,
    pub item_code: Option<String>,
    pub is_available: bool,
    pub last_fetched_at: DateTime<Utc>,
}

/// Insert/update counts from one bulk upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
}

/// Upserts a batch of canonical products in a single statement.
///
/// Conflicts on `(external_id, source_id)` update the mutable fields (name,
/// price, unit, quantity, url, currency, department code, item code,
/// availability, raw payload, `last_fetched_at`) in place. `ingredient_id`
/// is deliberately absent from the update list: it is written once at
/// insert time and never overwritten by later re-fetches.
///
/// The batch must not contain two records with the same `external_id`; a
/// single statement cannot touch the same row twice. Callers dedupe first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn bulk_upsert_products(
    pool: &PgPool,
    source_id: i64,
    products: &[CanonicalProduct],
) -> Result<UpsertStats, DbError> {
    if products.is_empty() {
        return Ok(UpsertStats::default());
    }

    let mut external_ids = Vec::with_capacity(products.len());
    let mut ingredient_ids = Vec::with_capacity(products.len());
    let mut names = Vec::with_capacity(products.len());
    let mut units = Vec::with_capacity(products.len());
    let mut quantities = Vec::with_capacity(products.len());
    let mut prices = Vec::with_capacity(products.len());
    let mut currencies = Vec::with_capacity(products.len());
    let mut urls: Vec<Option<String>> = Vec::with_capacity(products.len());
    let mut department_codes: Vec<Option<String>> = Vec::with_capacity(products.len());
    let mut item_codes: Vec<Option<String>> = Vec::with_capacity(products.len());
    let mut availabilities = Vec::with_capacity(products.len());
    let mut raws = Vec::with_capacity(products.len());

    for p in products {
        external_ids.push(p.external_id.clone());
        ingredient_ids.push(p.ingredient_id);
        names.push(p.name.clone());
        units.push(p.unit.clone());
        quantities.push(p.quantity);
        prices.push(p.price);
        currencies.push(p.currency.clone());
        urls.push(p.url.clone());
        department_codes.push(p.department_code.clone());
        item_codes.push(p.item_code.clone());
        availabilities.push(p.is_available);
        raws.push(p.raw.clone());
    }

    let inserted_flags: Vec<bool> = sqlx::query_scalar::<_, bool>(
        "INSERT INTO products \
             (source_id, external_id, ingredient_id, name, unit, quantity, price, \
              currency, url, department_code, item_code, is_available, raw, last_fetched_at) \
         SELECT $1, u.external_id, u.ingredient_id, u.name, u.unit, u.quantity, u.price, \
                u.currency, u.url, u.department_code, u.item_code, u.is_available, u.raw, NOW() \
         FROM UNNEST($2::text[], $3::bigint[], $4::text[], $5::text[], $6::float8[], \
                     $7::float8[], $8::text[], $9::text[], $10::text[], $11::text[], \
                     $12::bool[], $13::jsonb[]) \
              AS u(external_id, ingredient_id, name, unit, quantity, \
                   price, currency, url, department_code, item_code, \
                   is_available, raw) \
         ON CONFLICT (external_id, source_id) DO UPDATE SET \
             name            = EXCLUDED.name, \
             price           = EXCLUDED.price, \
             unit            = EXCLUDED.unit, \
             quantity        = EXCLUDED.quantity, \
             url             = EXCLUDED.url, \
             currency        = EXCLUDED.currency, \
             department_code = EXCLUDED.department_code, \
             item_code       = EXCLUDED.item_code, \
             is_available    = EXCLUDED.is_available, \
             raw             = EXCLUDED.raw, \
             last_fetched_at = NOW() \
         RETURNING (xmax = 0) AS inserted",
    )
    .bind(source_id)
    .bind(&external_ids)
    .bind(&ingredient_ids)
    .bind(&names)
    .bind(&units)
    .bind(&quantities)
    .bind(&prices)
    .bind(&currencies)
    .bind(&urls)
    .bind(&department_codes)
    .bind(&item_codes)
    .bind(&availabilities)
    .bind(&raws)
    .fetch_all(pool)
    .await?;

    let inserted = inserted_flags.iter().filter(|f| **f).count();
    let updated = inserted_flags.len() - inserted;
    Ok(UpsertStats { inserted, updated })
}

/// Lists products assigned to any of the given ingredients, newest fetch
/// first. Used by the paginated matcher to attach product records to each
/// matched ingredient.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products_by_ingredients(
    pool: &PgPool,
    ingredient_ids: &[i64],
) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(
        "SELECT id, source_id, external_id, ingredient_id, name, unit, quantity, price, \
                currency, url, department_code, item_code, is_available, last_fetched_at \
         FROM products \
         WHERE ingredient_id = ANY($1) \
         ORDER BY last_fetched_at DESC, id DESC",
    )
    .bind(ingredient_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
