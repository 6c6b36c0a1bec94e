//! Batch job that (re)builds the ingredient embedding index.

use std::collections::HashMap;

use pantrydb_db::list_ingredients;
use serde_json::json;
use sqlx::PgPool;

use crate::embedder::EmbedClient;
use crate::error::MatcherError;
use crate::vector_store::{Point, QdrantClient};

/// Embeds every ingredient (name plus any aliases) and upserts the vectors
/// into the Qdrant collection, with the facet fields (country, cuisine,
/// region, flavor) as payload so searches can filter on them. Points are
/// keyed by ingredient id, so re-running the job refreshes in place.
///
/// Returns the number of ingredients indexed.
///
/// # Errors
///
/// Returns [`MatcherError`] on database, embedder, or vector-store failure.
pub async fn build_ingredient_index(
    pool: &PgPool,
    embedder_url: &str,
    qdrant_url: &str,
    collection: &str,
) -> Result<usize, MatcherError> {
    let embedder = EmbedClient::new(embedder_url);
    let store = QdrantClient::new(qdrant_url, collection);
    store.ensure_collection().await?;

    let ingredients = list_ingredients(pool).await?;
    if ingredients.is_empty() {
        tracing::info!("no ingredients to index");
        return Ok(0);
    }

    let texts: Vec<String> = ingredients.iter().map(embedding_text).collect();
    let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let embeddings = embedder.embed(&text_refs).await?;

    let points: Vec<Point> = ingredients
        .iter()
        .zip(embeddings)
        .filter_map(|(ingredient, vector)| {
            let id = u64::try_from(ingredient.id).ok()?;
            let mut payload = HashMap::new();
            payload.insert("name".to_string(), json!(ingredient.name));
            for (key, value) in [
                ("country", &ingredient.country),
                ("cuisine", &ingredient.cuisine),
                ("region", &ingredient.region),
                ("flavor", &ingredient.flavor),
            ] {
                if let Some(v) = value {
                    payload.insert(key.to_string(), json!(v));
                }
            }
            Some(Point {
                id,
                vector,
                payload,
            })
        })
        .collect();

    let indexed = points.len();
    store.upsert_points(points).await?;
    tracing::info!(indexed, "ingredient index rebuilt");
    Ok(indexed)
}

/// The text an ingredient is embedded under: its name, with any aliases
/// appended so alias-shaped queries land near the same point.
fn embedding_text(ingredient: &pantrydb_db::IngredientRow) -> String {
    let mut text = ingredient.name.clone();
    for alias in &ingredient.aliases {
        text.push_str(", ");
        text.push_str(alias);
    }
    text
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pantrydb_db::IngredientRow;

    use super::*;

    fn ingredient(name: &str, aliases: &[&str]) -> IngredientRow {
        IngredientRow {
            id: 1,
            name: name.to_owned(),
            aliases: aliases.iter().map(|a| (*a).to_owned()).collect(),
            country: None,
            cuisine: None,
            region: None,
            flavor: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn embedding_text_is_the_bare_name_without_aliases() {
        assert_eq!(embedding_text(&ingredient("coconut milk", &[])), "coconut milk");
    }

    #[test]
    fn embedding_text_folds_aliases_in() {
        assert_eq!(
            embedding_text(&ingredient("coconut milk", &["kiri", "pol kiri"])),
            "coconut milk, kiri, pol kiri"
        );
    }
}
