//! Local embedding model using candle + sentence-transformers.

use super::Embedder;
use crate::error::{OptimizeError, Result};
use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use tokenizers::Tokenizer;

fn embedding_error(context: &str, err: impl std::fmt::Display) -> OptimizeError {
    OptimizeError::Embedding(format!("{}: {}", context, err))
}

/// BERT-family sentence embedding model with mean pooling.
pub struct HfEmbedder {
    model_id: String,
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    normalize: bool,
}

impl HfEmbedder {
    /// Load a sentence-transformers model by name from the Hugging Face Hub.
    ///
    /// Blocks while weights are downloaded and mapped.
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::Cpu; // Use CPU for portability

        let api = Api::new().map_err(|e| embedding_error("Failed to create HF Hub API", e))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| embedding_error("Failed to get config.json", e))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| embedding_error("Failed to get tokenizer.json", e))?;
        let weights_path = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))
            .map_err(|e| embedding_error("Failed to get model weights", e))?;

        let config_text =
            std::fs::read_to_string(&config_path).map_err(|e| OptimizeError::io(&config_path, e))?;
        let config: BertConfig = serde_json::from_str(&config_text)
            .map_err(|e| embedding_error("Failed to parse config", e))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| embedding_error("Failed to load tokenizer", e))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)
                .map_err(|e| embedding_error("Failed to load model weights", e))?
        };

        let model =
            BertModel::load(vb, &config).map_err(|e| embedding_error("Failed to load BERT model", e))?;

        tracing::info!(model = model_id, dim = config.hidden_size, "Loaded embedding model");

        Ok(Self {
            model_id: model_id.to_string(),
            model,
            tokenizer,
            device,
            dim: config.hidden_size,
            normalize: true,
        })
    }

    fn encode(&self, texts: &[String]) -> candle_core::Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| candle_core::Error::Msg(format!("Tokenization failed: {}", e)))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids_vec = Vec::new();
        let mut attention_mask_vec = Vec::new();
        let mut token_type_ids_vec = Vec::new();

        for encoding in &encodings {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();

            let mut padded_ids = ids.to_vec();
            let mut padded_mask = mask.to_vec();
            let mut padded_types = vec![0u32; ids.len()];

            padded_ids.resize(max_len, 0);
            padded_mask.resize(max_len, 0);
            padded_types.resize(max_len, 0);

            input_ids_vec.extend(padded_ids);
            attention_mask_vec.extend(padded_mask);
            token_type_ids_vec.extend(padded_types);
        }

        let batch_size = texts.len();

        let input_ids = Tensor::from_vec(input_ids_vec, (batch_size, max_len), &self.device)?;
        let attention_mask =
            Tensor::from_vec(attention_mask_vec, (batch_size, max_len), &self.device)?;
        let token_type_ids =
            Tensor::from_vec(token_type_ids_vec, (batch_size, max_len), &self.device)?;

        let output = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // Mean pooling over sequence dimension (with attention mask)
        let attention_mask_expanded = attention_mask
            .unsqueeze(2)?
            .to_dtype(output.dtype())?
            .broadcast_as(output.shape())?;

        let sum_embeddings = (output * &attention_mask_expanded)?.sum(1)?;
        let sum_mask = attention_mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;
        let mean_embeddings = (sum_embeddings / sum_mask)?;

        let final_embeddings = if self.normalize {
            let norms = mean_embeddings.sqr()?.sum_keepdim(1)?.sqrt()?;
            let shape = mean_embeddings.shape().clone();
            (mean_embeddings / norms.broadcast_as(&shape)?)?
        } else {
            mean_embeddings
        };

        final_embeddings.to_vec2::<f32>()
    }
}

#[async_trait]
impl Embedder for HfEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Inference runs on the caller's task; batches are small.
        self.encode(texts)
            .map_err(|e| embedding_error("Inference failed", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Downloads weights from the Hugging Face Hub
    async fn test_minilm_dimension() {
        let embedder = HfEmbedder::load("sentence-transformers/all-MiniLM-L6-v2").unwrap();
        assert_eq!(embedder.dimension(), 384);

        let vectors = embedder
            .embed_batch(&["hello world".to_string(), "vector search".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 384);
    }
}
