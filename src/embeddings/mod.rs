//! Embedding providers.
//!
//! - [`HfEmbedder`]: local sentence-transformers models via candle (feature `hf`)
//! - [`OpenAiEmbedder`]: any OpenAI-compatible `/v1/embeddings` endpoint
//! - [`MockEmbedder`]: deterministic hashed bag-of-words, for tests

#[cfg(feature = "hf")]
mod hf;
mod mock;
mod openai;

#[cfg(feature = "hf")]
pub use hf::HfEmbedder;
pub use mock::MockEmbedder;
pub use openai::OpenAiEmbedder;

use crate::config::Config;
use crate::error::{OptimizeError, Result};
use crate::settings::{EmbeddingProvider, EmbeddingSettings};
use async_trait::async_trait;
use std::sync::Arc;

/// Texts embedded per provider call.
pub const EMBED_BATCH_SIZE: usize = 32;

/// Turns text into fixed-size vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded in result metadata.
    fn model_id(&self) -> &str;

    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OptimizeError::Embedding("provider returned no vectors".to_string()))
    }
}

/// Build the embedder described by `settings`.
pub async fn create_embedder(
    settings: &EmbeddingSettings,
    config: &Config,
) -> Result<Arc<dyn Embedder>> {
    match settings.provider {
        EmbeddingProvider::Hf => create_hf(settings).await,
        EmbeddingProvider::OpenAi => {
            config.validate_openai()?;
            Ok(Arc::new(OpenAiEmbedder::new(
                config.openai.clone(),
                &settings.model,
                settings.dim,
            )))
        }
    }
}

#[cfg(feature = "hf")]
async fn create_hf(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let model = settings.model.clone();
    // Weight download and mmap are blocking.
    let embedder = tokio::task::spawn_blocking(move || HfEmbedder::load(&model))
        .await
        .map_err(|e| OptimizeError::Embedding(format!("model loader panicked: {}", e)))??;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "hf"))]
async fn create_hf(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    Err(OptimizeError::UnsupportedProvider(format!(
        "hf (model '{}'): rebuild with `--features hf`",
        settings.model
    )))
}

/// Embed `texts` in provider-sized batches and check every vector's length.
pub async fn embed_all(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(EMBED_BATCH_SIZE) {
        let embedded = embedder.embed_batch(batch).await?;
        if embedded.len() != batch.len() {
            return Err(OptimizeError::Embedding(format!(
                "expected {} vectors from '{}', got {}",
                batch.len(),
                embedder.model_id(),
                embedded.len()
            )));
        }
        for vector in &embedded {
            check_dimension(embedder, vector.len())?;
        }
        vectors.extend(embedded);
    }

    Ok(vectors)
}

pub(crate) fn check_dimension(embedder: &dyn Embedder, actual: usize) -> Result<()> {
    if actual != embedder.dimension() {
        return Err(OptimizeError::DimensionMismatch {
            model: embedder.model_id().to_string(),
            expected: embedder.dimension(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embed_all_batches() {
        let embedder = MockEmbedder::new("mock", 8);
        let texts: Vec<String> = (0..70).map(|i| format!("text number {}", i)).collect();

        let vectors = embed_all(&embedder, &texts).await.unwrap();
        assert_eq!(vectors.len(), 70);
        assert!(vectors.iter().all(|v| v.len() == 8));
    }

    #[tokio::test]
    async fn test_openai_requires_key() {
        let settings = EmbeddingSettings::new(EmbeddingProvider::OpenAi, "text-embedding-3-small", 1536);
        let result = create_embedder(&settings, &Config::default()).await;
        assert!(result.is_err());
    }

    #[cfg(not(feature = "hf"))]
    #[tokio::test]
    async fn test_hf_unavailable_without_feature() {
        let settings = EmbeddingSettings::new(EmbeddingProvider::Hf, "sentence-transformers/all-MiniLM-L6-v2", 384);
        let result = create_embedder(&settings, &Config::default()).await;
        assert!(matches!(result, Err(OptimizeError::UnsupportedProvider(_))));
    }
}
