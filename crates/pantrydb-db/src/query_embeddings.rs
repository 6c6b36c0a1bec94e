//! The query-embedding cache.
//!
//! Keyed by exact trimmed query text. Write-once: a query's embedding is
//! never refreshed, so a cached query never costs a second provider call.

use sqlx::PgPool;

use crate::DbError;

/// Looks up the cached embedding for an exact query string.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_query_embedding(
    pool: &PgPool,
    query: &str,
) -> Result<Option<Vec<f32>>, DbError> {
    let row = sqlx::query_scalar::<_, Vec<f32>>(
        "SELECT embedding FROM query_embeddings WHERE query = $1",
    )
    .bind(query)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Caches an embedding for a query string. A concurrent writer winning the
/// race is fine; the first write sticks and this one is a no-op.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_query_embedding(
    pool: &PgPool,
    query: &str,
    embedding: &[f32],
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO query_embeddings (query, embedding) \
         VALUES ($1, $2) \
         ON CONFLICT (query) DO NOTHING",
    )
    .bind(query)
    .bind(embedding)
    .execute(pool)
    .await?;

    Ok(())
}
