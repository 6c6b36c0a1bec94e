//! Database operations for the `mappings` table.
//!
//! At most one mapping per product: re-mapping a product replaces its
//! previous assignment rather than accumulating rows.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `mappings` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MappingRow {
    pub id: i64,
    pub product_id: i64,
    pub ingredient_id: i64,
    /// `"manual"`, `"ai"`, or `"text-similarity"`.
    pub method: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upserts the product→ingredient mapping.
///
/// Conflicts on `product_id` replace the ingredient, method, and confidence
/// in place. Returns the internal `id` of the mapping row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails (including a confidence
/// outside `[0, 1]`, which the schema rejects).
pub async fn upsert_mapping(
    pool: &PgPool,
    product_id: i64,
    ingredient_id: i64,
    method: &str,
    confidence: f64,
) -> Result<i64, DbError> {
    let id: i64 = sqlx::query_scalar::<_, i64>(
        "INSERT INTO mappings (product_id, ingredient_id, method, confidence) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (product_id) DO UPDATE SET \
             ingredient_id = EXCLUDED.ingredient_id, \
             method        = EXCLUDED.method, \
             confidence    = EXCLUDED.confidence, \
             updated_at    = NOW() \
         RETURNING id",
    )
    .bind(product_id)
    .bind(ingredient_id)
    .bind(method)
    .bind(confidence)
    .fetch_one(pool)
    .await?;

    Ok(id)
}
