//! In-process store with exact nearest-neighbour search.
//!
//! Graph parameters are recorded in the index key but search is always exact.

use super::VectorStore;
use crate::error::{OptimizeError, Result};
use crate::index::{IndexDocument, IndexKey, IndexSpec, IndexStatus, decode_vector};
use crate::metrics::Hit;
use crate::settings::DistanceMetric;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredDoc {
    item_id: String,
    text: String,
    vector: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Index name -> key of the current population.
    indexes: HashMap<String, IndexKey>,
    /// Document key -> document. Ordered so scans are deterministic.
    docs: BTreeMap<String, StoredDoc>,
    json: HashMap<String, serde_json::Value>,
}

/// Thread-safe in-memory [`VectorStore`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys of all stored documents starting with `prefix:`.
    pub async fn document_keys(&self, prefix: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        let prefix = format!("{}:", prefix);
        inner
            .docs
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Raw vector bytes stored under a document key.
    pub async fn vector_bytes(&self, doc_key: &str) -> Option<Vec<u8>> {
        let inner = self.inner.read().await;
        inner.docs.get(doc_key).map(|d| d.vector.clone())
    }

    /// Text stored under a document key.
    pub async fn document_text(&self, doc_key: &str) -> Option<String> {
        let inner = self.inner.read().await;
        inner.docs.get(doc_key).map(|d| d.text.clone())
    }

    /// Key of the population currently recorded for `index_name`.
    pub async fn current_key(&self, index_name: &str) -> Option<IndexKey> {
        self.inner.read().await.indexes.get(index_name).copied()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<IndexStatus> {
        let mut inner = self.inner.write().await;
        match inner.indexes.get(&spec.name) {
            Some(existing) if *existing == spec.key => Ok(IndexStatus::Ready),
            _ => {
                debug!(index = %spec.name, key = %spec.key, "Recreating in-memory index");
                inner.indexes.insert(spec.name.clone(), spec.key);
                Ok(IndexStatus::Created)
            }
        }
    }

    async fn doc_count(&self, spec: &IndexSpec) -> Result<usize> {
        let inner = self.inner.read().await;
        let prefix = format!("{}:", spec.prefix);
        let expected = spec.vector_byte_len();
        Ok(inner
            .docs
            .iter()
            .filter(|(k, d)| k.starts_with(&prefix) && d.vector.len() == expected)
            .count())
    }

    async fn load(&self, spec: &IndexSpec, docs: Vec<IndexDocument>) -> Result<()> {
        let mut inner = self.inner.write().await;
        for doc in docs {
            inner.docs.insert(
                spec.doc_key(&doc.item_id),
                StoredDoc {
                    item_id: doc.item_id,
                    text: doc.text,
                    vector: doc.vector,
                },
            );
        }
        Ok(())
    }

    async fn remove_stale(&self, spec: &IndexSpec, keep: &HashSet<String>) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let prefix = format!("{}:", spec.prefix);
        let before = inner.docs.len();
        inner
            .docs
            .retain(|key, doc| !key.starts_with(&prefix) || keep.contains(&doc.item_id));
        Ok(before - inner.docs.len())
    }

    async fn search(&self, spec: &IndexSpec, vector: &[u8], k: usize) -> Result<Vec<Hit>> {
        let data_type = spec.key.vector_data_type;
        let query = decode_vector(vector, data_type)
            .filter(|q| q.len() == spec.key.dim)
            .ok_or_else(|| {
                OptimizeError::Store(format!(
                    "query vector has {} bytes, index '{}' expects {}",
                    vector.len(),
                    spec.name,
                    spec.vector_byte_len()
                ))
            })?;

        let inner = self.inner.read().await;
        let prefix = format!("{}:", spec.prefix);

        // Documents whose vector does not fit the schema are skipped, like
        // RediSearch does for hashes that fail to index.
        let mut hits: Vec<Hit> = inner
            .docs
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(_, doc)| {
                let stored = decode_vector(&doc.vector, data_type)?;
                if stored.len() != query.len() {
                    return None;
                }
                Some(Hit {
                    item_id: doc.item_id.clone(),
                    distance: distance(spec.key.distance_metric, &query, &stored),
                })
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);

        Ok(hits)
    }

    async fn put_json(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.json.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let inner = self.inner.read().await;
        Ok(inner.json.get(key).cloned())
    }
}

/// Distance with the same conventions as RediSearch: lower is closer.
fn distance(metric: DistanceMetric, a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    match metric {
        DistanceMetric::Cosine => {
            let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
            let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                1.0
            } else {
                1.0 - dot / (norm_a * norm_b)
            }
        }
        DistanceMetric::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
        DistanceMetric::Ip => 1.0 - dot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{GraphParams, encode_vector};
    use crate::settings::{Algorithm, VectorDataType};

    fn spec(dim: usize, metric: DistanceMetric) -> IndexSpec {
        IndexSpec {
            name: "test-idx".to_string(),
            prefix: "doc".to_string(),
            key: IndexKey {
                algorithm: Algorithm::Flat,
                distance_metric: metric,
                vector_data_type: VectorDataType::Float32,
                dim,
                graph: None,
            },
            ef_runtime: 10,
        }
    }

    fn doc(id: &str, v: &[f32]) -> IndexDocument {
        IndexDocument {
            item_id: id.to_string(),
            text: format!("text {}", id),
            vector: encode_vector(v, VectorDataType::Float32),
        }
    }

    #[test]
    fn test_distance_conventions() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!(distance(DistanceMetric::Cosine, &a, &a).abs() < 1e-12);
        assert!((distance(DistanceMetric::Cosine, &a, &b) - 1.0).abs() < 1e-12);
        assert!((distance(DistanceMetric::L2, &a, &b) - 2.0).abs() < 1e-12);
        assert!(distance(DistanceMetric::Ip, &a, &a).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_ensure_index_reuses_matching_key() {
        let store = MemoryStore::new();
        let s = spec(2, DistanceMetric::Cosine);

        assert_eq!(store.ensure_index(&s).await.unwrap(), IndexStatus::Created);
        assert_eq!(store.ensure_index(&s).await.unwrap(), IndexStatus::Ready);

        let mut hnsw = s.clone();
        hnsw.key.algorithm = Algorithm::Hnsw;
        hnsw.key.graph = Some(GraphParams {
            ef_construction: 200,
            m: 16,
        });
        assert_eq!(store.ensure_index(&hnsw).await.unwrap(), IndexStatus::Created);
        assert_eq!(store.current_key("test-idx").await, Some(hnsw.key));
    }

    #[tokio::test]
    async fn test_search_orders_by_distance() {
        let store = MemoryStore::new();
        let s = spec(2, DistanceMetric::Cosine);
        store.ensure_index(&s).await.unwrap();
        store
            .load(&s, vec![doc("x", &[1.0, 0.0]), doc("y", &[0.0, 1.0]), doc("z", &[1.0, 1.0])])
            .await
            .unwrap();

        let query = encode_vector(&[1.0, 0.1], VectorDataType::Float32);
        let hits = store.search(&s, &query, 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].item_id, "x");
        assert_eq!(hits[1].item_id, "z");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn test_load_overwrites_and_skips_stale_dims() {
        let store = MemoryStore::new();
        let small = spec(2, DistanceMetric::L2);
        let large = spec(3, DistanceMetric::L2);

        store.load(&small, vec![doc("a", &[1.0, 0.0]), doc("b", &[0.0, 1.0])]).await.unwrap();
        store.load(&large, vec![doc("a", &[1.0, 0.0, 0.0])]).await.unwrap();

        assert_eq!(store.document_keys("doc").await.len(), 2);
        assert_eq!(store.vector_bytes("doc:a").await.unwrap().len(), 12);
        assert_eq!(store.doc_count(&large).await.unwrap(), 1);

        let query = encode_vector(&[0.0, 0.0, 1.0], VectorDataType::Float32);
        let hits = store.search(&large, &query, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item_id, "a");
    }

    #[tokio::test]
    async fn test_remove_stale_keeps_current_items() {
        let store = MemoryStore::new();
        let s = spec(2, DistanceMetric::Cosine);
        store
            .load(&s, vec![doc("a", &[1.0, 0.0]), doc("b", &[0.0, 1.0]), doc("c", &[1.0, 1.0])])
            .await
            .unwrap();
        store.put_json("other:c", &serde_json::json!({})).await.unwrap();

        let keep: HashSet<String> = ["a".to_string(), "c".to_string()].into();
        assert_eq!(store.remove_stale(&s, &keep).await.unwrap(), 1);
        assert_eq!(store.document_keys("doc").await, vec!["doc:a", "doc:c"]);
        assert_eq!(store.remove_stale(&s, &keep).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_rejects_wrong_query_size() {
        let store = MemoryStore::new();
        let s = spec(4, DistanceMetric::Cosine);
        let query = encode_vector(&[1.0, 0.0], VectorDataType::Float32);
        assert!(store.search(&s, &query, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_json_roundtrip() {
        let store = MemoryStore::new();
        let value = serde_json::json!({"metrics": {"retrieval": {"f1_at_k": 0.4}}});
        store.put_json("eval:1", &value).await.unwrap();

        assert_eq!(store.get_json("eval:1").await.unwrap(), Some(value));
        assert_eq!(store.get_json("eval:2").await.unwrap(), None);
    }
}
