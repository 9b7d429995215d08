//! A single evaluation run.
//!
//! Construction prepares the shared index (creating and populating it when
//! its key changed); [`Eval::calc_metrics`] runs the labeled queries, scores
//! them and persists the report under `eval:<test_id>`.

use crate::config::Config;
use crate::data::{EvalData, LabeledItem, RawItem};
use crate::embeddings::{self, Embedder, check_dimension, embed_all};
use crate::error::{OptimizeError, Result};
use crate::index::{IndexDocument, IndexSpec, IndexStatus};
use crate::metrics::{
    MetricsAccumulator, QueryOutcome, RetrievalMetrics, ThresholdResult, find_best_threshold,
};
use crate::settings::{
    Algorithm, DistanceMetric, EmbeddingProvider, RunId, Settings, VectorDataType,
};
use crate::store::{RedisStore, VectorStore};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Latency figures recorded alongside retrieval quality.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct LatencyMetrics {
    /// Mean time to embed and run one query.
    pub avg_query_time_ms: f64,
    /// Time spent embedding and loading the corpus (0 when reused).
    pub indexing_time_secs: f64,
}

/// The `metrics` section of a result document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct MetricsSection {
    pub retrieval: RetrievalMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<ThresholdResult>,
    #[serde(default)]
    pub latency: LatencyMetrics,
}

/// The `metadata` section of a result document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct RunMetadata {
    pub test_id: RunId,
    pub embedding_provider: EmbeddingProvider,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub algorithm: Algorithm,
    pub distance_metric: DistanceMetric,
    pub vector_data_type: VectorDataType,
    pub ef_construction: usize,
    pub ef_runtime: usize,
    pub m: usize,
    pub ret_k: usize,
    pub num_queries: usize,
    pub num_docs: usize,
}

/// Result document persisted for every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct EvalReport {
    pub metrics: MetricsSection,
    pub metadata: RunMetadata,
}

impl EvalReport {
    /// Print summary to stdout.
    pub fn print_summary(&self) {
        let r = &self.metrics.retrieval;
        let m = &self.metadata;
        println!("\n========== Evaluation Results ==========");
        println!("Run:        {}", m.test_id);
        println!("Model:      {} ({}, dim {})", m.embedding_model, m.embedding_provider, m.embedding_dim);
        println!(
            "Index:      {} / {} / {}",
            m.algorithm, m.distance_metric, m.vector_data_type
        );
        if m.algorithm == Algorithm::Hnsw {
            println!(
                "Graph:      m={} ef_construction={} ef_runtime={}",
                m.m, m.ef_construction, m.ef_runtime
            );
        }
        println!("Queries:    {} (k = {}, {} docs)", m.num_queries, m.ret_k, m.num_docs);
        println!("-----------------------------------------");
        println!("Precision@k: {:.4}", r.precision_at_k);
        println!("Recall@k:    {:.4}", r.recall_at_k);
        println!("F1@k:        {:.4}", r.f1_at_k);
        if let Some(t) = &self.metrics.threshold {
            println!("-----------------------------------------");
            println!(
                "Best threshold: {:.4} (P {:.3}, R {:.3}, F1 {:.3})",
                t.threshold, t.precision, t.recall, t.f1
            );
        }
        println!("-----------------------------------------");
        println!("Avg query time: {:.1}ms", self.metrics.latency.avg_query_time_ms);
        println!("Indexing time:  {:.2}s", self.metrics.latency.indexing_time_secs);
        println!("=========================================\n");
    }
}

/// Fetch the report persisted for `test_id`.
pub async fn fetch_report(store: &dyn VectorStore, test_id: &RunId) -> Result<EvalReport> {
    let key = test_id.result_key();
    let value = store
        .get_json(&key)
        .await?
        .ok_or(OptimizeError::ResultNotFound(key))?;
    Ok(serde_json::from_value(value)?)
}

/// What the shared documents were last loaded from.
///
/// The index key alone cannot tell two corpora, or two models of the same
/// dimension, apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Population {
    embedding_model: String,
    corpus_digest: String,
}

impl Population {
    fn new(embedding_model: &str, items: &[RawItem]) -> Self {
        Self {
            embedding_model: embedding_model.to_string(),
            corpus_digest: corpus_digest(items),
        }
    }
}

/// Digest of item ids and texts, independent of file order.
fn corpus_digest(items: &[RawItem]) -> String {
    let mut sorted: Vec<&RawItem> = items.iter().collect();
    sorted.sort_by(|a, b| a.item_id.cmp(&b.item_id));

    let mut hasher = DefaultHasher::new();
    for item in sorted {
        item.item_id.hash(&mut hasher);
        item.text.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

/// One evaluation run over a prepared index.
pub struct Eval {
    settings: Settings,
    spec: IndexSpec,
    find_threshold: bool,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    labeled_items: Vec<LabeledItem>,
    num_docs: usize,
    populated: bool,
    indexing_time: Duration,
}

impl Eval {
    /// Connect to Redis and the configured embedding provider, then prepare the index.
    pub async fn new(settings: Settings, find_threshold: bool, config: &Config) -> Result<Self> {
        settings.validate()?;

        let embedder = embeddings::create_embedder(&settings.embedding, config).await?;
        let store: Arc<dyn VectorStore> = Arc::new(RedisStore::connect(&settings.redis_url).await?);

        Self::with_components(settings, find_threshold, embedder, store).await
    }

    /// Prepare the index using caller-supplied components.
    pub async fn with_components(
        settings: Settings,
        find_threshold: bool,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        settings.validate()?;

        if embedder.dimension() != settings.embedding.dim {
            return Err(OptimizeError::DimensionMismatch {
                model: settings.embedding.model.clone(),
                expected: settings.embedding.dim,
                actual: embedder.dimension(),
            });
        }

        let data = EvalData::load(&settings.data)?;
        let spec = IndexSpec::from_settings(&settings);

        let population = Population::new(&settings.embedding.model, &data.raw_items);

        let status = store.ensure_index(&spec).await?;
        let populated = match status {
            IndexStatus::Created => true,
            IndexStatus::Ready => {
                let recorded = store
                    .get_json(&spec.population_key())
                    .await?
                    .and_then(|v| serde_json::from_value::<Population>(v).ok());
                recorded.as_ref() != Some(&population)
                    || store.doc_count(&spec).await? != data.raw_items.len()
            }
        };

        let start = Instant::now();
        if populated {
            info!(
                test_id = %settings.test_id,
                key = %spec.key,
                items = data.raw_items.len(),
                "Populating index"
            );
            populate(
                &spec,
                embedder.as_ref(),
                store.as_ref(),
                &data.raw_items,
                &population,
            )
            .await?;
        } else {
            debug!(key = %spec.key, "Index already populated, skipping load");
        }
        let indexing_time = if populated {
            start.elapsed()
        } else {
            Duration::ZERO
        };

        Ok(Self {
            settings,
            spec,
            find_threshold,
            embedder,
            store,
            labeled_items: data.labeled_items,
            num_docs: data.raw_items.len(),
            populated,
            indexing_time,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn test_id(&self) -> &RunId {
        &self.settings.test_id
    }

    pub fn index_spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Whether construction (re)loaded the corpus.
    pub fn populated(&self) -> bool {
        self.populated
    }

    pub fn indexing_time(&self) -> Duration {
        self.indexing_time
    }

    /// Run every labeled query, compute metrics and persist the report.
    pub async fn calc_metrics(&self) -> Result<EvalReport> {
        let k = self.settings.ret_k;
        let mut acc = MetricsAccumulator::new(k);
        let mut outcomes = Vec::with_capacity(self.labeled_items.len());
        let mut query_time = Duration::ZERO;

        for item in &self.labeled_items {
            let start = Instant::now();
            let vector = self.embedder.embed(&item.query).await?;
            check_dimension(self.embedder.as_ref(), vector.len())?;
            let encoded = self.spec.encode_vector(&vector)?;
            let hits = self.store.search(&self.spec, &encoded, k).await?;
            query_time += start.elapsed();

            debug!(query = %item.query, hits = hits.len(), "Query complete");

            let relevant = item.relevant_set().into_iter().map(str::to_string);
            let outcome = QueryOutcome::new(hits, relevant);
            acc.record(&outcome);
            outcomes.push(outcome);
        }

        let threshold = if self.find_threshold {
            find_best_threshold(&outcomes)
        } else {
            None
        };

        let avg_query_time_ms = if outcomes.is_empty() {
            0.0
        } else {
            query_time.as_secs_f64() * 1000.0 / outcomes.len() as f64
        };

        let report = EvalReport {
            metrics: MetricsSection {
                retrieval: acc.finish(),
                threshold,
                latency: LatencyMetrics {
                    avg_query_time_ms,
                    indexing_time_secs: self.indexing_time.as_secs_f64(),
                },
            },
            metadata: self.metadata(acc.queries()),
        };

        let key = self.settings.test_id.result_key();
        self.store
            .put_json(&key, &serde_json::to_value(&report)?)
            .await?;

        info!(
            key = %key,
            precision = report.metrics.retrieval.precision_at_k,
            recall = report.metrics.retrieval.recall_at_k,
            f1 = report.metrics.retrieval.f1_at_k,
            "Stored evaluation result"
        );

        Ok(report)
    }

    fn metadata(&self, num_queries: usize) -> RunMetadata {
        let s = &self.settings;
        RunMetadata {
            test_id: s.test_id.clone(),
            embedding_provider: s.embedding.provider,
            embedding_model: s.embedding.model.clone(),
            embedding_dim: s.embedding.dim,
            algorithm: s.index.algorithm,
            distance_metric: s.index.distance_metric,
            vector_data_type: s.index.vector_data_type,
            ef_construction: s.index.ef_construction,
            ef_runtime: s.index.ef_runtime,
            m: s.index.m,
            ret_k: s.ret_k,
            num_queries,
            num_docs: self.num_docs,
        }
    }
}

/// Embed every raw item, write it to the index and drop documents of items
/// no longer in the corpus.
async fn populate(
    spec: &IndexSpec,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    items: &[RawItem],
    population: &Population,
) -> Result<()> {
    let texts: Vec<String> = items.iter().map(|i| i.text.clone()).collect();
    let vectors = embed_all(embedder, &texts).await?;

    let docs = items
        .iter()
        .zip(vectors)
        .map(|(item, vector)| {
            Ok(IndexDocument {
                item_id: item.item_id.clone(),
                text: item.text.clone(),
                vector: spec.encode_vector(&vector)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    store.load(spec, docs).await?;

    let keep: HashSet<String> = items.iter().map(|i| i.item_id.clone()).collect();
    let removed = store.remove_stale(spec, &keep).await?;
    if removed > 0 {
        debug!(index = %spec.name, removed, "Dropped documents from a previous corpus");
    }

    store
        .put_json(&spec.population_key(), &serde_json::to_value(population)?)
        .await
}
