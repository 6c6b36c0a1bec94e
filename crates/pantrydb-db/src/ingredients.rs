//! Database operations for the `ingredients` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// Name of the catch-all ingredient new products are assigned to.
pub const PLACEHOLDER_INGREDIENT: &str = "__unmapped__";

/// A row from the `ingredients` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngredientRow {
    pub id: i64,
    pub name: String,
    /// Alternate names the ingredient is listed under.
    pub aliases: Vec<String>,
    pub country: Option<String>,
    pub cuisine: Option<String>,
    pub region: Option<String>,
    pub flavor: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Returns the id of the placeholder ingredient, creating the row if the
/// seed from the initial migration is somehow missing.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn placeholder_ingredient_id(pool: &PgPool) -> Result<i64, DbError> {
    let id: i64 = sqlx::query_scalar::<_, i64>(
        "INSERT INTO ingredients (name) \
         VALUES ($1) \
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
         RETURNING id",
    )
    .bind(PLACEHOLDER_INGREDIENT)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Fetches one ingredient by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no such ingredient exists, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_ingredient(pool: &PgPool, id: i64) -> Result<IngredientRow, DbError> {
    sqlx::query_as::<_, IngredientRow>(
        "SELECT id, name, aliases, country, cuisine, region, flavor, created_at \
         FROM ingredients WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Fetches ingredients by id, in no particular order. Ids with no matching
/// row are silently absent from the result.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_ingredients_by_ids(
    pool: &PgPool,
    ids: &[i64],
) -> Result<Vec<IngredientRow>, DbError> {
    let rows = sqlx::query_as::<_, IngredientRow>(
        "SELECT id, name, aliases, country, cuisine, region, flavor, created_at \
         FROM ingredients WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Lists every real ingredient (the placeholder excluded), ordered by name.
/// Used by the embedding-index job.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_ingredients(pool: &PgPool) -> Result<Vec<IngredientRow>, DbError> {
    let rows = sqlx::query_as::<_, IngredientRow>(
        "SELECT id, name, aliases, country, cuisine, region, flavor, created_at \
         FROM ingredients WHERE name <> $1 ORDER BY name",
    )
    .bind(PLACEHOLDER_INGREDIENT)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
