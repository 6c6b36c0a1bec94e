//! Live integration tests for the matcher: require a Postgres server for
//! the query-embedding cache (`#[sqlx::test]`) and mock the embedder and
//! vector store with `wiremock`. Run with
//! `cargo test -p pantrydb-matcher -- --ignored`.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pantrydb_matcher::{IngredientMatcher, MatchFilters};

async fn insert_test_ingredient(pool: &sqlx::PgPool, name: &str) -> i64 {
    sqlx::query_scalar::<_, i64>("INSERT INTO ingredients (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap_or_else(|e| panic!("insert_test_ingredient failed for '{name}': {e}"))
}

fn qdrant_hit(id: i64, score: f64) -> serde_json::Value {
    json!({"result": [{"id": id, "score": score}], "status": "ok"})
}

#[ignore = "requires a live Postgres via DATABASE_URL"]
#[sqlx::test(migrations = "../../migrations")]
async fn cached_query_never_calls_the_embedder_twice(pool: sqlx::PgPool) {
    let ingredient_id = insert_test_ingredient(&pool, "coconut milk").await;

    let embedder = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&json!([[0.1, 0.2, 0.3]])))
        .expect(1)
        .mount(&embedder)
        .await;

    let qdrant = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/collections/ingredients/points/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&qdrant_hit(ingredient_id, 0.92)))
        .expect(2)
        .mount(&qdrant)
        .await;

    let matcher = IngredientMatcher::new(
        pool,
        &embedder.uri(),
        &qdrant.uri(),
        "ingredients",
        10,
    );

    let first = matcher
        .match_ingredient("coconut milk", &MatchFilters::default())
        .await
        .expect("first match failed");
    // Same trimmed text; must be served from the cache.
    let second = matcher
        .match_ingredient("  coconut milk  ", &MatchFilters::default())
        .await
        .expect("second match failed");

    assert_eq!(
        first.ingredient.as_ref().map(|i| i.id),
        Some(ingredient_id)
    );
    assert_eq!(second.ingredient.map(|i| i.id), Some(ingredient_id));
    assert!((first.confidence - 0.92).abs() < 1e-6);
    // Mock expectations verify the embedder was called exactly once.
}

#[ignore = "requires a live Postgres via DATABASE_URL"]
#[sqlx::test(migrations = "../../migrations")]
async fn no_candidate_yields_null_match_with_zero_confidence(pool: sqlx::PgPool) {
    let embedder = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&json!([[0.4, 0.5]])))
        .mount(&embedder)
        .await;

    let qdrant = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/collections/ingredients/points/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&json!({"result": []})))
        .mount(&qdrant)
        .await;

    let matcher = IngredientMatcher::new(
        pool,
        &embedder.uri(),
        &qdrant.uri(),
        "ingredients",
        10,
    );

    let result = matcher
        .match_ingredient("unobtainium paste", &MatchFilters::default())
        .await
        .expect("match failed");

    assert!(result.ingredient.is_none());
    assert_eq!(result.confidence, 0.0);
}
