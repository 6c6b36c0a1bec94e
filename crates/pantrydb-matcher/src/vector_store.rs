//! Qdrant vector store client for the ingredient embedding index.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::MatcherError;
use crate::MatchFilters;

/// Vector dimension for Qwen3-Embedding-0.6B.
const VECTOR_DIM: u64 = 1024;

/// Qdrant HTTP client.
pub(crate) struct QdrantClient {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

#[derive(Serialize)]
struct CreateCollectionRequest {
    vectors: VectorsConfig,
}

#[derive(Serialize)]
struct VectorsConfig {
    size: u64,
    distance: String,
}

#[derive(Serialize)]
struct UpsertPointsRequest {
    points: Vec<Point>,
}

#[derive(Serialize)]
pub(crate) struct Point {
    pub(crate) id: u64,
    pub(crate) vector: Vec<f32>,
    pub(crate) payload: HashMap<String, Value>,
}

/// One hit from a similarity search. `id` is the ingredient id the point
/// was indexed under; `score` is the backend's normalized closeness metric.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct ScoredPoint {
    pub(crate) id: u64,
    pub(crate) score: f32,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

impl QdrantClient {
    #[must_use]
    pub(crate) fn new(qdrant_url: &str, collection: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: qdrant_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
        }
    }

    /// Ensure the ingredient collection exists, creating it if absent.
    ///
    /// Uses cosine distance and 1024-dimensional vectors.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError::VectorStore`] on network or API failure.
    pub(crate) async fn ensure_collection(&self) -> Result<(), MatcherError> {
        let url = format!("{}/collections/{}", self.base_url, self.collection);
        let check = self.client.get(&url).send().await;

        // If the collection already exists, return early.
        if let Ok(resp) = check {
            if resp.status().is_success() {
                return Ok(());
            }
        }

        let body = CreateCollectionRequest {
            vectors: VectorsConfig {
                size: VECTOR_DIM,
                distance: "Cosine".to_string(),
            },
        };

        let resp = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MatcherError::VectorStore(format!("collection create failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(MatcherError::VectorStore(format!(
                "collection create returned status {}",
                resp.status()
            )));
        }

        Ok(())
    }

    /// Upsert a batch of ingredient points into the collection.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError::VectorStore`] on network or API failure.
    pub(crate) async fn upsert_points(&self, points: Vec<Point>) -> Result<(), MatcherError> {
        if points.is_empty() {
            return Ok(());
        }

        let url = format!("{}/collections/{}/points", self.base_url, self.collection);
        let body = UpsertPointsRequest { points };

        let resp = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MatcherError::VectorStore(format!("upsert request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(MatcherError::VectorStore(format!(
                "upsert returned status {}",
                resp.status()
            )));
        }

        Ok(())
    }

    /// Top-K similarity search, optionally intersected with equality
    /// filters on the payload facets. Results come back best-first.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError::VectorStore`] on network or API failure, or
    /// if the response cannot be parsed.
    pub(crate) async fn search(
        &self,
        vector: &[f32],
        filters: &MatchFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ScoredPoint>, MatcherError> {
        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        );

        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "offset": offset,
            "with_payload": false,
        });
        let conditions = filter_conditions(filters);
        if !conditions.is_empty() {
            body["filter"] = json!({ "must": conditions });
        }

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MatcherError::VectorStore(format!("search request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(MatcherError::VectorStore(format!(
                "search returned status {}",
                resp.status()
            )));
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| MatcherError::VectorStore(format!("search response parse error: {e}")))?;

        Ok(parsed.result)
    }
}

/// Equality conditions on payload facets, one per set filter field.
fn filter_conditions(filters: &MatchFilters) -> Vec<Value> {
    [
        ("country", &filters.country),
        ("cuisine", &filters.cuisine),
        ("region", &filters.region),
        ("flavor", &filters.flavor),
    ]
    .into_iter()
    .filter_map(|(key, value)| {
        value
            .as_ref()
            .map(|v| json!({"key": key, "match": {"value": v}}))
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn empty_filters_produce_no_conditions() {
        assert!(filter_conditions(&MatchFilters::default()).is_empty());
    }

    #[test]
    fn set_filters_become_equality_conditions() {
        let filters = MatchFilters {
            country: Some("LK".to_owned()),
            flavor: Some("sweet".to_owned()),
            ..MatchFilters::default()
        };
        let conditions = filter_conditions(&filters);
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0]["key"], "country");
        assert_eq!(conditions[0]["match"]["value"], "LK");
    }

    #[tokio::test]
    async fn search_parses_scored_points() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/ingredients/points/search"))
            .and(body_partial_json(json!({"limit": 5, "offset": 0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(&json!({
                "result": [
                    {"id": 3, "score": 0.91},
                    {"id": 8, "score": 0.54},
                ],
                "status": "ok",
            })))
            .mount(&server)
            .await;

        let client = QdrantClient::new(&server.uri(), "ingredients");
        let hits = client
            .search(&[0.1, 0.2], &MatchFilters::default(), 5, 0)
            .await
            .expect("search failed");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 3);
        assert!((hits[0].score - 0.91).abs() < 1e-6);
    }

    #[tokio::test]
    async fn search_sends_filter_conditions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/ingredients/points/search"))
            .and(body_partial_json(json!({
                "filter": {"must": [{"key": "country", "match": {"value": "LK"}}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&json!({"result": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = QdrantClient::new(&server.uri(), "ingredients");
        let filters = MatchFilters {
            country: Some("LK".to_owned()),
            ..MatchFilters::default()
        };
        let hits = client
            .search(&[0.5], &filters, 10, 0)
            .await
            .expect("search failed");

        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn ensure_collection_creates_when_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/ingredients"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/ingredients"))
            .and(body_partial_json(
                json!({"vectors": {"size": 1024, "distance": "Cosine"}}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(&json!({"result": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = QdrantClient::new(&server.uri(), "ingredients");
        client.ensure_collection().await.expect("ensure failed");
    }
}
