//! Gemini embedding client
//!
//! Must use the same embedding model the ingestion job used to build the index.

use super::Embedder;
use crate::error::ComplianceError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::error;

pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(api_key: String, base_url: &str, model: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/models/{}:embedContent", base_url.trim_end_matches('/'), model),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.api_key.is_empty() {
            return Err(ComplianceError::Embedding(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let request = EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ComplianceError::Embedding(format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "Embedding API error response: {}", body);
            return Err(ComplianceError::Embedding(format!(
                "embedding API returned {}",
                status
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ComplianceError::Embedding(format!("parse error: {}", e)))?;

        if parsed.embedding.values.is_empty() {
            return Err(ComplianceError::Embedding("empty embedding".to_string()));
        }

        Ok(parsed.embedding.values)
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_and_request_shape() {
        let embedder =
            GeminiEmbedder::new("key".to_string(), "http://localhost:9/v1beta/", "text-embedding-004")
                .unwrap();
        assert_eq!(
            embedder.endpoint,
            "http://localhost:9/v1beta/models/text-embedding-004:embedContent"
        );

        let request = EmbedRequest {
            model: "models/text-embedding-004".to_string(),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: "NOM-019".to_string(),
                }],
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["content"]["parts"][0]["text"], "NOM-019");
    }

    #[tokio::test]
    async fn test_missing_key_is_an_embedding_error() {
        let embedder =
            GeminiEmbedder::new(String::new(), "http://localhost:9", "text-embedding-004").unwrap();
        assert!(matches!(
            embedder.embed("anything").await,
            Err(ComplianceError::Embedding(_))
        ));
    }
}
