//! OpenAI-compatible embeddings client.
//!
//! Works with any endpoint that implements `POST /v1/embeddings`.

use super::Embedder;
use crate::config::OpenAiConfig;
use crate::error::{OptimizeError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Request body for an embeddings call.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// Response from an embeddings call.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Embedder backed by an OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiConfig,
    model: String,
    dim: usize,
    /// Send `dimensions` with each request (text-embedding-3 models only).
    request_dimensions: bool,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiConfig, model: impl Into<String>, dim: usize) -> Self {
        let model = model.into();
        let request_dimensions = model.starts_with("text-embedding-3");
        Self {
            client: Client::new(),
            config,
            model,
            dim,
            request_dimensions,
        }
    }

    /// Get the API endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/embeddings", base)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.request_dimensions.then_some(self.dim),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                return Err(OptimizeError::Embedding(format!(
                    "API error ({}): {}",
                    status, api_error.error.message
                )));
            }
            return Err(OptimizeError::Embedding(format!(
                "Request failed ({}): {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body)?;
        into_ordered(parsed, texts.len()).ok_or_else(|| {
            OptimizeError::Embedding("response indices do not match the request".to_string())
        })
    }
}

/// Reorder response entries by their `index` field.
fn into_ordered(response: EmbeddingResponse, expected: usize) -> Option<Vec<Vec<f32>>> {
    if response.data.len() != expected {
        return None;
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for entry in response.data {
        let slot = slots.get_mut(entry.index)?;
        if slot.is_some() {
            return None;
        }
        *slot = Some(entry.embedding);
    }
    slots.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_construction() {
        let config = OpenAiConfig {
            api_base: "https://api.example.com/".to_string(),
            api_key: "test".to_string(),
        };
        let embedder = OpenAiEmbedder::new(config, "text-embedding-3-small", 512);
        assert_eq!(embedder.endpoint(), "https://api.example.com/v1/embeddings");
        assert!(embedder.request_dimensions);

        let legacy = OpenAiEmbedder::new(OpenAiConfig::default(), "text-embedding-ada-002", 1536);
        assert!(!legacy.request_dimensions);
    }

    #[test]
    fn test_response_reordered_by_index() {
        let body = r#"{"data": [
            {"index": 1, "embedding": [0.0, 1.0]},
            {"index": 0, "embedding": [1.0, 0.0]}
        ]}"#;
        let response: EmbeddingResponse = serde_json::from_str(body).unwrap();
        let vectors = into_ordered(response, 2).unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_response_with_gaps_rejected() {
        let body = r#"{"data": [
            {"index": 0, "embedding": [1.0]},
            {"index": 0, "embedding": [2.0]}
        ]}"#;
        let response: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert!(into_ordered(response, 2).is_none());
    }

    #[test]
    fn test_request_serialization() {
        let input = vec!["a".to_string()];
        let request = EmbeddingRequest {
            model: "m",
            input: &input,
            dimensions: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"model": "m", "input": ["a"]}));
    }
}
