//! Match and search command handlers.

use pantrydb_core::AppConfig;
use pantrydb_matcher::{IngredientMatcher, MatchFilters};

fn build_matcher(pool: &sqlx::PgPool, config: &AppConfig) -> IngredientMatcher {
    IngredientMatcher::new(
        pool.clone(),
        &config.embedder_url,
        &config.qdrant_url,
        &config.qdrant_collection,
        config.match_top_k,
    )
}

/// Match a free-text query to the single best ingredient and print the
/// result. With `map_product` set, a successful match is also persisted as
/// a `text-similarity` mapping for that product, carrying the match
/// confidence.
///
/// # Errors
///
/// Returns an error for an empty query, a backend failure, or (when
/// mapping) a database failure. "No match" prints and exits cleanly.
pub(crate) async fn run_match(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    query: &str,
    filters: &MatchFilters,
    map_product: Option<i64>,
) -> anyhow::Result<()> {
    let matcher = build_matcher(pool, config);
    let result = matcher.match_ingredient(query, filters).await?;

    let Some(ingredient) = result.ingredient else {
        println!("no ingredient matched '{query}'");
        return Ok(());
    };

    println!(
        "matched '{}' -> {} (id {}, confidence {:.3})",
        query, ingredient.name, ingredient.id, result.confidence
    );

    if let Some(product_id) = map_product {
        let mapping_id = pantrydb_db::upsert_mapping(
            pool,
            product_id,
            ingredient.id,
            "text-similarity",
            result.confidence,
        )
        .await?;
        println!("mapped product {product_id} to ingredient {} (mapping {mapping_id})", ingredient.id);
    }

    Ok(())
}

/// Paginated ingredient search, printing each match with its product
/// listings. `page` is 1-based.
///
/// # Errors
///
/// Returns an error for an empty query or a backend failure.
pub(crate) async fn run_search(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    query: &str,
    filters: &MatchFilters,
    page: usize,
    limit: usize,
) -> anyhow::Result<()> {
    let matcher = build_matcher(pool, config);
    let offset = page.saturating_sub(1).saturating_mul(limit);
    let matches = matcher.search_ingredients(query, filters, offset, limit).await?;

    if matches.is_empty() {
        println!("no ingredients matched '{query}' (page {page})");
        return Ok(());
    }

    for m in &matches {
        println!(
            "{} (id {}, confidence {:.3}), {} listings",
            m.ingredient.name,
            m.ingredient.id,
            m.confidence,
            m.products.len()
        );
        for p in &m.products {
            let availability = if p.is_available { "" } else { " [unavailable]" };
            println!(
                "  {}: {} {} {} for {:.2} {}{}",
                p.external_id, p.name, p.quantity, p.unit, p.price, p.currency, availability
            );
        }
    }

    Ok(())
}
