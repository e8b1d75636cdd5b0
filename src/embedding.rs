//! # Embedding Client Module
//!
//! ## Purpose
//! Thin client for an OpenAI-compatible embedding API, treated as a black-box
//! `text -> vector` function by the rest of the system.
//!
//! ## Input/Output Specification
//! - **Input**: UTF-8 text (case gists, search queries)
//! - **Output**: Fixed-dimensionality float vector (1536 for ada-002)
//! - **Disabled mode**: Without an API key the client reports itself disabled
//!   and semantic features degrade to empty results rather than errors.

use crate::config::EmbeddingConfig;
use crate::errors::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client for the embedding generation API
pub struct EmbeddingClient {
    config: EmbeddingConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    /// Create a new embedding client
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        if config.api_key.is_none() {
            tracing::warn!("Embedding API key not configured - semantic search is disabled");
        }

        Ok(Self { config, client })
    }

    /// Whether an embedding backend is configured
    pub fn is_enabled(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Vector dimensionality the configured model produces
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Generate an embedding for the given text.
    ///
    /// One request, no retries; callers wrap this in a `RetryPolicy`.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let api_key = self.config.api_key.as_ref().ok_or_else(|| {
            SearchError::EmbeddingFailed {
                details: "embedding backend not configured".to_string(),
            }
        })?;

        let url = format!("{}/embeddings", self.config.api_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&EmbeddingRequest {
                model: &self.config.model,
                input: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::EmbeddingFailed {
                details: format!("API returned status {}", response.status()),
            });
        }

        let body: EmbeddingResponse = response.json().await?;
        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| SearchError::EmbeddingFailed {
                details: "API returned no embedding rows".to_string(),
            })?;

        if embedding.len() != self.config.dimension {
            tracing::warn!(
                "Embedding dimension {} differs from configured {}",
                embedding.len(),
                self.config.dimension
            );
        }

        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_url: String, api_key: Option<String>) -> EmbeddingConfig {
        EmbeddingConfig {
            api_url,
            api_key,
            model: "text-embedding-ada-002".to_string(),
            dimension: 3,
            ..EmbeddingConfig::default()
        }
    }

    #[tokio::test]
    async fn embed_returns_first_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({
                "model": "text-embedding-ada-002"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;

        let client =
            EmbeddingClient::new(test_config(server.uri(), Some("key".to_string()))).unwrap();
        let vector = client.embed("裁判要旨").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn embed_surfaces_api_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client =
            EmbeddingClient::new(test_config(server.uri(), Some("key".to_string()))).unwrap();
        let err = client.embed("text").await.unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn client_without_key_is_disabled() {
        let client = EmbeddingClient::new(test_config("http://unused".to_string(), None)).unwrap();
        assert!(!client.is_enabled());
        assert!(client.embed("text").await.is_err());
    }
}
