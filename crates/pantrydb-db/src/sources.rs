//! Database operations for the `sources` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `sources` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SourceRow {
    pub id: i64,
    pub name: String,
    pub country: String,
    /// `"api"` or `"scraper"`.
    pub kind: String,
    pub base_url: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// Looks a source up by name, creating it on first contact with a retailer.
/// The base endpoint is refreshed on every run so a retailer moving hosts
/// is reflected without manual intervention.
///
/// Returns the internal `id`. Sources are never deleted by the pipeline, so
/// the id is stable across runs.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn get_or_create_source(
    pool: &PgPool,
    name: &str,
    country: &str,
    kind: &str,
    base_url: &str,
) -> Result<i64, DbError> {
    let id: i64 = sqlx::query_scalar::<_, i64>(
        "INSERT INTO sources (name, country, kind, base_url) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (name) DO UPDATE SET base_url = EXCLUDED.base_url \
         RETURNING id",
    )
    .bind(name)
    .bind(country)
    .bind(kind)
    .bind(base_url)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Stamps `last_fetched_at` after a successful ingestion run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn touch_last_fetch(pool: &PgPool, source_id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE sources SET last_fetched_at = NOW() WHERE id = $1")
        .bind(source_id)
        .execute(pool)
        .await?;
    Ok(())
}
