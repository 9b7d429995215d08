//! Typed settings for a single evaluation run.
//!
//! Every tag that ends up in an index schema is a closed enum, so a typo in a
//! YAML file or on the command line fails at parse time instead of surfacing
//! later as a RediSearch syntax error.

use crate::config::default_redis_url;
use crate::error::{OptimizeError, Result};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Vector index algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Exact brute-force search.
    Flat,
    /// Hierarchical navigable small world graph.
    Hnsw,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Flat => "flat",
            Algorithm::Hnsw => "hnsw",
        }
    }

    /// Name used in RediSearch schema definitions.
    pub fn redis_name(&self) -> &'static str {
        match self {
            Algorithm::Flat => "FLAT",
            Algorithm::Hnsw => "HNSW",
        }
    }
}

/// Distance metric used to rank neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    L2,
    Ip,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::Ip => "ip",
        }
    }

    /// Name used in RediSearch schema definitions.
    pub fn redis_name(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "COSINE",
            DistanceMetric::L2 => "L2",
            DistanceMetric::Ip => "IP",
        }
    }
}

/// Element type of stored vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VectorDataType {
    Float32,
    Float64,
}

impl VectorDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorDataType::Float32 => "float32",
            VectorDataType::Float64 => "float64",
        }
    }

    /// Name used in RediSearch schema definitions.
    pub fn redis_name(&self) -> &'static str {
        match self {
            VectorDataType::Float32 => "FLOAT32",
            VectorDataType::Float64 => "FLOAT64",
        }
    }

    /// Bytes per vector element.
    pub fn element_size(&self) -> usize {
        match self {
            VectorDataType::Float32 => 4,
            VectorDataType::Float64 => 8,
        }
    }
}

/// Source of embedding vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode, clap::ValueEnum)]
pub enum EmbeddingProvider {
    /// Local sentence-transformers weights from the Hugging Face Hub.
    #[serde(rename = "hf")]
    #[value(name = "hf")]
    Hf,
    /// OpenAI-compatible `/v1/embeddings` endpoint.
    #[serde(rename = "openai")]
    #[value(name = "openai")]
    OpenAi,
}

impl EmbeddingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingProvider::Hf => "hf",
            EmbeddingProvider::OpenAi => "openai",
        }
    }
}

/// On-disk format of raw and labeled data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputDataType {
    /// A single JSON array.
    #[default]
    Json,
    /// One JSON object per line.
    Jsonl,
}

impl InputDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputDataType::Json => "json",
            InputDataType::Jsonl => "jsonl",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(Algorithm, DistanceMetric, VectorDataType, EmbeddingProvider, InputDataType);

/// Unique identifier of one evaluation run.
///
/// `RunId::default()` generates a fresh UUID on every call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Use a caller-supplied identifier.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which the run's result document is stored.
    pub fn result_key(&self) -> String {
        format!("eval:{}", self.0)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Embedding model reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct EmbeddingSettings {
    /// Provider tag (`hf` or `openai`)
    pub provider: EmbeddingProvider,
    /// Model identifier (e.g., "sentence-transformers/all-MiniLM-L6-v2")
    pub model: String,
    /// Output dimensionality
    pub dim: usize,
}

impl EmbeddingSettings {
    pub fn new(provider: EmbeddingProvider, model: impl Into<String>, dim: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            dim,
        }
    }
}

/// Locations of the raw corpus and the labeled queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    pub labeled_data_path: PathBuf,
    pub raw_data_path: PathBuf,
    #[serde(default)]
    pub input_data_type: InputDataType,
}

impl DataSettings {
    pub fn new(
        raw_data_path: impl Into<PathBuf>,
        labeled_data_path: impl Into<PathBuf>,
        input_data_type: InputDataType,
    ) -> Self {
        Self {
            labeled_data_path: labeled_data_path.into(),
            raw_data_path: raw_data_path.into(),
            input_data_type,
        }
    }
}

/// Vector index schema and tuning parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub algorithm: Algorithm,
    #[serde(default = "default_distance_metric")]
    pub distance_metric: DistanceMetric,
    #[serde(default = "default_vector_data_type")]
    pub vector_data_type: VectorDataType,
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,
    #[serde(default = "default_ef_runtime")]
    pub ef_runtime: usize,
    #[serde(default = "default_m")]
    pub m: usize,
}

fn default_distance_metric() -> DistanceMetric {
    DistanceMetric::Cosine
}

fn default_vector_data_type() -> VectorDataType {
    VectorDataType::Float32
}

pub(crate) fn default_ef_construction() -> usize {
    200
}

pub(crate) fn default_ef_runtime() -> usize {
    10
}

pub(crate) fn default_m() -> usize {
    16
}

impl IndexSettings {
    /// Index with the given algorithm and RediSearch default parameters.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            distance_metric: default_distance_metric(),
            vector_data_type: default_vector_data_type(),
            ef_construction: default_ef_construction(),
            ef_runtime: default_ef_runtime(),
            m: default_m(),
        }
    }

    pub fn with_distance_metric(mut self, metric: DistanceMetric) -> Self {
        self.distance_metric = metric;
        self
    }

    pub fn with_vector_data_type(mut self, vector_data_type: VectorDataType) -> Self {
        self.vector_data_type = vector_data_type;
        self
    }

    pub fn with_graph_params(mut self, ef_construction: usize, ef_runtime: usize, m: usize) -> Self {
        self.ef_construction = ef_construction;
        self.ef_runtime = ef_runtime;
        self.m = m;
        self
    }
}

/// Complete configuration of one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub test_id: RunId,
    pub index: IndexSettings,
    pub embedding: EmbeddingSettings,
    pub data: DataSettings,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_ret_k")]
    pub ret_k: usize,
}

fn default_ret_k() -> usize {
    1
}

impl Settings {
    /// Create settings with a freshly generated run identifier.
    pub fn new(index: IndexSettings, embedding: EmbeddingSettings, data: DataSettings) -> Self {
        Self {
            test_id: RunId::new(),
            index,
            embedding,
            data,
            redis_url: default_redis_url(),
            ret_k: default_ret_k(),
        }
    }

    pub fn with_test_id(mut self, test_id: RunId) -> Self {
        self.test_id = test_id;
        self
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    pub fn with_ret_k(mut self, ret_k: usize) -> Self {
        self.ret_k = ret_k;
        self
    }

    /// Check numeric ranges, identifiers and data file locations.
    pub fn validate(&self) -> Result<()> {
        if self.test_id.as_str().trim().is_empty() {
            return Err(OptimizeError::InvalidConfig(
                "test_id must not be empty".to_string(),
            ));
        }

        if self.embedding.model.trim().is_empty() {
            return Err(OptimizeError::InvalidConfig(
                "embedding model must not be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("embedding dim", self.embedding.dim),
            ("ret_k", self.ret_k),
            ("ef_construction", self.index.ef_construction),
            ("ef_runtime", self.index.ef_runtime),
            ("m", self.index.m),
        ] {
            if value == 0 {
                return Err(OptimizeError::InvalidConfig(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.redis_url.trim().is_empty() {
            return Err(OptimizeError::InvalidConfig(
                "redis_url must not be empty".to_string(),
            ));
        }

        for path in [&self.data.raw_data_path, &self.data.labeled_data_path] {
            if !path.is_file() {
                return Err(OptimizeError::DataNotFound(path.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_settings(dir: &tempfile::TempDir) -> Settings {
        let raw = dir.path().join("raw.json");
        let labeled = dir.path().join("labeled.json");
        std::fs::write(&raw, "[]").unwrap();
        std::fs::write(&labeled, "[]").unwrap();

        Settings::new(
            IndexSettings::new(Algorithm::Flat),
            EmbeddingSettings::new(EmbeddingProvider::Hf, "sentence-transformers/all-MiniLM-L6-v2", 384),
            DataSettings::new(raw, labeled, InputDataType::Json),
        )
    }

    #[test]
    fn test_fresh_run_id_per_construction() {
        let dir = tempfile::TempDir::new().unwrap();
        let a = sample_settings(&dir);
        let b = sample_settings(&dir);
        assert_ne!(a.test_id, b.test_id);
        assert_ne!(RunId::default(), RunId::default());
    }

    #[test]
    fn test_deserialized_settings_get_distinct_ids() {
        let yaml = r#"
index:
  algorithm: flat
embedding:
  provider: hf
  model: sentence-transformers/all-MiniLM-L6-v2
  dim: 384
data:
  raw_data_path: raw.json
  labeled_data_path: labeled.json
"#;
        let a: Settings = serde_yaml::from_str(yaml).unwrap();
        let b: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_ne!(a.test_id, b.test_id);
        assert_eq!(a.redis_url, "redis://localhost:6379/0");
        assert_eq!(a.ret_k, 1);
        assert_eq!(a.index.distance_metric, DistanceMetric::Cosine);
        assert_eq!(a.index.m, 16);
    }

    #[test]
    fn test_unknown_tags_rejected() {
        let yaml = "algorithm: ivf\n";
        assert!(serde_yaml::from_str::<IndexSettings>(yaml).is_err());

        let yaml = "algorithm: flat\ndistance_metric: manhattan\n";
        assert!(serde_yaml::from_str::<IndexSettings>(yaml).is_err());

        let yaml = "algorithm: flat\nvector_data_type: int8\n";
        assert!(serde_yaml::from_str::<IndexSettings>(yaml).is_err());
    }

    #[test]
    fn test_validate_accepts_sample() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(sample_settings(&dir).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_params() {
        let dir = tempfile::TempDir::new().unwrap();

        let settings = sample_settings(&dir).with_ret_k(0);
        assert!(matches!(settings.validate(), Err(OptimizeError::InvalidConfig(_))));

        let mut settings = sample_settings(&dir);
        settings.embedding.dim = 0;
        assert!(settings.validate().is_err());

        let mut settings = sample_settings(&dir);
        settings.index.m = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut settings = sample_settings(&dir);
        settings.data.raw_data_path = dir.path().join("missing.json");
        assert!(matches!(settings.validate(), Err(OptimizeError::DataNotFound(_))));
    }

    #[test]
    fn test_result_key() {
        let id = RunId::from_string("abc");
        assert_eq!(id.result_key(), "eval:abc");
        assert_eq!(id.to_string(), "abc");
    }

    #[test]
    fn test_redis_names() {
        assert_eq!(Algorithm::Hnsw.redis_name(), "HNSW");
        assert_eq!(DistanceMetric::Ip.redis_name(), "IP");
        assert_eq!(VectorDataType::Float64.redis_name(), "FLOAT64");
        assert_eq!(VectorDataType::Float32.element_size(), 4);
        assert_eq!(EmbeddingProvider::OpenAi.to_string(), "openai");
    }
}
