//! TEI (Text Embeddings Inference) client for vector generation.

use serde::Serialize;

use crate::error::MatcherError;

/// Maximum number of texts per /embed call.
const BATCH_SIZE: usize = 64;

/// TEI HTTP client.
pub(crate) struct EmbedClient {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [&'a str],
}

impl EmbedClient {
    #[must_use]
    pub(crate) fn new(embedder_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/embed", embedder_url.trim_end_matches('/')),
        }
    }

    /// Generate embeddings for a batch of texts.
    ///
    /// Texts are batched into groups of [`BATCH_SIZE`] per request. Returns
    /// one embedding vector per input text, in the same order.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError::Embedder`] if the request fails or the
    /// response cannot be parsed.
    pub(crate) async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, MatcherError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let request = EmbedRequest { inputs: chunk };
            let response = self
                .client
                .post(&self.url)
                .json(&request)
                .send()
                .await
                .map_err(|e| MatcherError::Embedder(format!("embed request failed: {e}")))?;

            if !response.status().is_success() {
                return Err(MatcherError::Embedder(format!(
                    "embedder returned status {}",
                    response.status()
                )));
            }

            let embeddings: Vec<Vec<f32>> = response
                .json()
                .await
                .map_err(|e| MatcherError::Embedder(format!("embed response parse error: {e}")))?;

            if embeddings.len() != chunk.len() {
                return Err(MatcherError::Embedder(format!(
                    "embedder returned {} embeddings for {} inputs",
                    embeddings.len(),
                    chunk.len()
                )));
            }

            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    /// Generate a single embedding.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError::Embedder`] on request or parse failure, or
    /// when the provider returns no vector.
    pub(crate) async fn embed_one(&self, text: &str) -> Result<Vec<f32>, MatcherError> {
        let mut embeddings = self.embed(&[text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| MatcherError::Embedder("embedder returned no vector".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn embeds_a_batch_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .and(body_partial_json(json!({"inputs": ["sugar", "salt"]})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(&json!([[0.1, 0.2], [0.3, 0.4]])),
            )
            .mount(&server)
            .await;

        let client = EmbedClient::new(&server.uri());
        let embeddings = client.embed(&["sugar", "salt"]).await.expect("embed failed");

        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0], vec![0.1, 0.2]);
        assert_eq!(embeddings[1], vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = EmbedClient::new(&server.uri());
        let result = client.embed_one("sugar").await;

        assert!(matches!(result, Err(MatcherError::Embedder(_))));
    }

    #[tokio::test]
    async fn count_mismatch_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&json!([[0.1]])))
            .mount(&server)
            .await;

        let client = EmbedClient::new(&server.uri());
        let result = client.embed(&["a", "b"]).await;

        assert!(matches!(result, Err(MatcherError::Embedder(_))));
    }
}
