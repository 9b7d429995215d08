//! Vector index and result store backends.
//!
//! [`RedisStore`] talks to Redis Stack (RediSearch + RedisJSON).
//! [`MemoryStore`] keeps everything in process with the same key layout and
//! index-identity rules, for tests and dry runs.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::error::Result;
use crate::index::{IndexDocument, IndexSpec, IndexStatus};
use crate::metrics::Hit;
use async_trait::async_trait;
use std::collections::HashSet;

/// Backend holding the shared vector index and persisted result documents.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Make sure an index matching `spec.key` exists.
    ///
    /// Returns [`IndexStatus::Created`] when the index had to be (re)built,
    /// in which case the caller must repopulate it. Existing documents are
    /// never deleted.
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<IndexStatus>;

    /// Number of documents currently indexed under `spec`.
    async fn doc_count(&self, spec: &IndexSpec) -> Result<usize>;

    /// Write documents, overwriting any with the same item id.
    async fn load(&self, spec: &IndexSpec, docs: Vec<IndexDocument>) -> Result<()>;

    /// Delete documents under `spec.prefix` whose item id is not in `keep`.
    ///
    /// Returns the number of documents removed.
    async fn remove_stale(&self, spec: &IndexSpec, keep: &HashSet<String>) -> Result<usize>;

    /// Nearest neighbours of an encoded query vector, closest first.
    async fn search(&self, spec: &IndexSpec, vector: &[u8], k: usize) -> Result<Vec<Hit>>;

    /// Store a JSON document under `key`, replacing any previous value.
    async fn put_json(&self, key: &str, value: &serde_json::Value) -> Result<()>;

    /// Fetch a JSON document previously written with [`VectorStore::put_json`].
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>>;
}
