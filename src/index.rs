//! Index identity and document layout.
//!
//! All runs share one index name and one document prefix. The [`IndexKey`]
//! of the population currently held by the store is recorded next to the
//! index; a run whose key differs recreates the index definition and
//! overwrites every document in place.
//!
//! Concurrent runs with different keys are NOT safe: one run may repopulate
//! vectors while another is querying. Nothing here locks the shared index.

use crate::error::{OptimizeError, Result};
use crate::settings::{Algorithm, DistanceMetric, Settings, VectorDataType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index name shared by every evaluation run.
pub const DEFAULT_INDEX_NAME: &str = "ret-opt";

/// Key prefix of indexed documents.
pub const DEFAULT_PREFIX: &str = "rvl";

/// Hash field holding the item identifier.
pub const ID_FIELD: &str = "item_id";
/// Hash field holding the item text.
pub const TEXT_FIELD: &str = "text";
/// Hash field holding the encoded vector.
pub const VECTOR_FIELD: &str = "vector";

/// Parameters that only matter for graph indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphParams {
    pub ef_construction: usize,
    pub m: usize,
}

/// Everything that determines the content of a populated index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexKey {
    pub algorithm: Algorithm,
    pub distance_metric: DistanceMetric,
    pub vector_data_type: VectorDataType,
    pub dim: usize,
    /// `None` for flat indexes.
    pub graph: Option<GraphParams>,
}

impl IndexKey {
    /// Stable string form stored alongside the index.
    pub fn fingerprint(&self) -> String {
        let mut fp = format!(
            "{}:{}:{}:{}",
            self.algorithm, self.distance_metric, self.vector_data_type, self.dim
        );
        if let Some(graph) = self.graph {
            fp.push_str(&format!(":efc={}:m={}", graph.ef_construction, graph.m));
        }
        fp
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

/// Schema and query parameters for one run's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub prefix: String,
    pub key: IndexKey,
    /// Query-time search breadth (HNSW only).
    pub ef_runtime: usize,
}

impl IndexSpec {
    /// Spec for the shared index using a run's settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let index = &settings.index;
        let graph = match index.algorithm {
            Algorithm::Flat => None,
            Algorithm::Hnsw => Some(GraphParams {
                ef_construction: index.ef_construction,
                m: index.m,
            }),
        };

        Self {
            name: DEFAULT_INDEX_NAME.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            key: IndexKey {
                algorithm: index.algorithm,
                distance_metric: index.distance_metric,
                vector_data_type: index.vector_data_type,
                dim: settings.embedding.dim,
                graph,
            },
            ef_runtime: index.ef_runtime,
        }
    }

    /// Storage key of the document holding `item_id`.
    pub fn doc_key(&self, item_id: &str) -> String {
        format!("{}:{}", self.prefix, item_id)
    }

    /// Storage key of the recorded [`IndexKey`] fingerprint.
    pub fn fingerprint_key(&self) -> String {
        format!("{}:fingerprint", self.name)
    }

    /// Storage key of the record describing the loaded documents.
    pub fn population_key(&self) -> String {
        format!("{}:population", self.name)
    }

    /// Expected byte length of one encoded vector.
    pub fn vector_byte_len(&self) -> usize {
        self.key.dim * self.key.vector_data_type.element_size()
    }

    /// Encode a vector in this index's element type.
    pub fn encode_vector(&self, vector: &[f32]) -> Result<Vec<u8>> {
        if vector.len() != self.key.dim {
            return Err(OptimizeError::InvalidConfig(format!(
                "vector has {} elements but index '{}' expects {}",
                vector.len(),
                self.name,
                self.key.dim
            )));
        }
        Ok(encode_vector(vector, self.key.vector_data_type))
    }
}

/// Whether [`crate::store::VectorStore::ensure_index`] reused or rebuilt the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// An index with the same key already existed.
    Ready,
    /// The index was created or recreated and must be populated.
    Created,
}

/// One item ready to be written to the store.
#[derive(Debug, Clone)]
pub struct IndexDocument {
    pub item_id: String,
    pub text: String,
    pub vector: Vec<u8>,
}

/// Little-endian encoding of a vector.
pub fn encode_vector(vector: &[f32], data_type: VectorDataType) -> Vec<u8> {
    match data_type {
        VectorDataType::Float32 => vector.iter().flat_map(|v| v.to_le_bytes()).collect(),
        VectorDataType::Float64 => vector
            .iter()
            .flat_map(|v| f64::from(*v).to_le_bytes())
            .collect(),
    }
}

/// Inverse of [`encode_vector`]. Returns `None` on a truncated buffer.
pub fn decode_vector(bytes: &[u8], data_type: VectorDataType) -> Option<Vec<f64>> {
    let size = data_type.element_size();
    if bytes.len() % size != 0 {
        return None;
    }

    let values = match data_type {
        VectorDataType::Float32 => bytes
            .chunks_exact(4)
            .map(|c| f64::from(f32::from_le_bytes([c[0], c[1], c[2], c[3]])))
            .collect(),
        VectorDataType::Float64 => bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect(),
    };
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{
        DataSettings, EmbeddingProvider, EmbeddingSettings, IndexSettings, InputDataType,
    };

    fn settings(algorithm: Algorithm, dim: usize) -> Settings {
        Settings::new(
            IndexSettings::new(algorithm),
            EmbeddingSettings::new(EmbeddingProvider::Hf, "model", dim),
            DataSettings::new("raw.json", "labeled.json", InputDataType::Json),
        )
    }

    #[test]
    fn test_flat_key_ignores_graph_params() {
        let a = settings(Algorithm::Flat, 384);
        let mut b = settings(Algorithm::Flat, 384);
        b.index.m = 48;
        b.index.ef_construction = 300;

        assert_eq!(
            IndexSpec::from_settings(&a).key,
            IndexSpec::from_settings(&b).key
        );
    }

    #[test]
    fn test_hnsw_key_tracks_graph_params() {
        let a = settings(Algorithm::Hnsw, 384);
        let mut b = settings(Algorithm::Hnsw, 384);
        b.index.m = 48;

        let ka = IndexSpec::from_settings(&a).key;
        let kb = IndexSpec::from_settings(&b).key;
        assert_ne!(ka, kb);
        assert_eq!(ka.fingerprint(), "hnsw:cosine:float32:384:efc=200:m=16");
    }

    #[test]
    fn test_dimension_changes_key() {
        let a = IndexSpec::from_settings(&settings(Algorithm::Flat, 384));
        let b = IndexSpec::from_settings(&settings(Algorithm::Flat, 1024));
        assert_ne!(a.key, b.key);
        assert_eq!(a.name, b.name);
        assert_eq!(a.doc_key("x"), "rvl:x");
    }

    #[test]
    fn test_encoding_lengths() {
        let spec = IndexSpec::from_settings(&settings(Algorithm::Flat, 3));
        let bytes = spec.encode_vector(&[1.0, -2.0, 0.5]).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes.len(), spec.vector_byte_len());
        assert_eq!(
            decode_vector(&bytes, VectorDataType::Float32).unwrap(),
            vec![1.0, -2.0, 0.5]
        );

        assert_eq!(encode_vector(&[1.0, 2.0], VectorDataType::Float64).len(), 16);
        assert!(spec.encode_vector(&[1.0]).is_err());
        assert!(decode_vector(&[0u8; 5], VectorDataType::Float32).is_none());
    }
}
