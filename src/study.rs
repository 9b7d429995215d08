//! Parameter search over embedding models and index settings.
//!
//! A [`Study`] samples [`TrialParams`] from the ranges in a [`StudyConfig`],
//! runs one [`Eval`] per trial and ranks trials by a weighted objective.

use crate::config::Config;
use crate::embeddings::{self, Embedder};
use crate::error::{OptimizeError, Result};
use crate::eval::{Eval, EvalReport};
use crate::metrics::{RetrievalMetrics, ThresholdResult};
use crate::settings::{
    Algorithm, DataSettings, DistanceMetric, EmbeddingSettings, IndexSettings, InputDataType,
    RunId, Settings, VectorDataType,
};
use crate::store::{RedisStore, VectorStore};
use async_trait::async_trait;
use bincode::{Decode, Encode};
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One candidate embedding model.
pub type EmbeddingModel = EmbeddingSettings;

/// Inclusive integer range, written `[min, max]` in YAML.
pub type Range = (usize, usize);

/// Metric that can contribute to the study objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    PrecisionAtK,
    RecallAtK,
    F1AtK,
    /// Mean query latency; give it a negative weight to penalise slow trials.
    AvgQueryTimeMs,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::PrecisionAtK => "precision_at_k",
            MetricName::RecallAtK => "recall_at_k",
            MetricName::F1AtK => "f1_at_k",
            MetricName::AvgQueryTimeMs => "avg_query_time_ms",
        }
    }

    /// Read this metric from a finished evaluation.
    pub fn value(&self, report: &EvalReport) -> f64 {
        let retrieval = &report.metrics.retrieval;
        match self {
            MetricName::PrecisionAtK => retrieval.precision_at_k,
            MetricName::RecallAtK => retrieval.recall_at_k,
            MetricName::F1AtK => retrieval.f1_at_k,
            MetricName::AvgQueryTimeMs => report.metrics.latency.avg_query_time_ms,
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_ret_k_range() -> Range {
    (1, 10)
}

fn default_ef_runtime_range() -> Range {
    (10, 50)
}

fn default_ef_construction_range() -> Range {
    (100, 300)
}

fn default_m_range() -> Range {
    (8, 64)
}

fn default_algorithm() -> Algorithm {
    Algorithm::Hnsw
}

fn default_distance_metric() -> DistanceMetric {
    DistanceMetric::Cosine
}

fn default_vector_data_type() -> VectorDataType {
    VectorDataType::Float32
}

/// Study definition, usually read from YAML.
///
/// ```yaml
/// raw_data_path: data/raw.json
/// labeled_data_path: data/labeled.json
/// input_data_type: json
/// embedding_models:
///   - provider: hf
///     model: sentence-transformers/all-MiniLM-L6-v2
///     dim: 384
/// metrics: [f1_at_k, avg_query_time_ms]
/// weights: [1.0, -0.01]
/// n_trials: 20
/// n_jobs: 2
/// ret_k: [1, 10]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    #[serde(default)]
    pub study_id: RunId,
    pub raw_data_path: PathBuf,
    pub labeled_data_path: PathBuf,
    #[serde(default)]
    pub input_data_type: InputDataType,
    pub embedding_models: Vec<EmbeddingModel>,
    pub metrics: Vec<MetricName>,
    pub weights: Vec<f64>,
    pub n_trials: usize,
    pub n_jobs: usize,
    #[serde(default = "default_ret_k_range")]
    pub ret_k: Range,
    #[serde(default = "default_ef_runtime_range")]
    pub ef_runtime: Range,
    #[serde(default = "default_ef_construction_range")]
    pub ef_construction: Range,
    #[serde(default = "default_m_range")]
    pub m: Range,
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,
    #[serde(default = "default_distance_metric")]
    pub distance_metric: DistanceMetric,
    #[serde(default = "default_vector_data_type")]
    pub vector_data_type: VectorDataType,
    /// Falls back to the application config when absent.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Seed for reproducible sampling.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub find_threshold: bool,
}

impl StudyConfig {
    /// Load and validate a YAML study file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| OptimizeError::io(path, e))?;
        let config = Self::from_yaml(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| OptimizeError::InvalidConfig(format!("study config: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding_models.is_empty() {
            return Err(OptimizeError::InvalidConfig(
                "at least one embedding model is required".to_string(),
            ));
        }
        if let Some(model) = self
            .embedding_models
            .iter()
            .find(|m| m.model.trim().is_empty() || m.dim == 0)
        {
            return Err(OptimizeError::InvalidConfig(format!(
                "invalid embedding model '{}' (dim {})",
                model.model, model.dim
            )));
        }

        if self.metrics.is_empty() {
            return Err(OptimizeError::InvalidConfig(
                "at least one metric is required".to_string(),
            ));
        }
        if self.weights.len() != self.metrics.len() {
            return Err(OptimizeError::InvalidConfig(format!(
                "{} weights given for {} metrics",
                self.weights.len(),
                self.metrics.len()
            )));
        }

        if self.n_trials == 0 {
            return Err(OptimizeError::InvalidConfig(
                "n_trials must be greater than 0".to_string(),
            ));
        }
        if self.n_jobs == 0 {
            return Err(OptimizeError::InvalidConfig(
                "n_jobs must be greater than 0".to_string(),
            ));
        }

        for (name, (min, max)) in [
            ("ret_k", self.ret_k),
            ("ef_runtime", self.ef_runtime),
            ("ef_construction", self.ef_construction),
            ("m", self.m),
        ] {
            if min == 0 || min > max {
                return Err(OptimizeError::InvalidConfig(format!(
                    "{} range [{}, {}] must satisfy 0 < min <= max",
                    name, min, max
                )));
            }
        }

        Ok(())
    }

    /// Weighted sum of the configured metrics.
    pub fn objective(&self, report: &EvalReport) -> f64 {
        self.metrics
            .iter()
            .zip(&self.weights)
            .map(|(metric, weight)| weight * metric.value(report))
            .sum()
    }

    fn data_settings(&self) -> DataSettings {
        DataSettings::new(
            self.raw_data_path.clone(),
            self.labeled_data_path.clone(),
            self.input_data_type,
        )
    }
}

/// Parameters of a single trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TrialParams {
    pub embedding: EmbeddingModel,
    pub ret_k: usize,
    pub ef_runtime: usize,
    pub ef_construction: usize,
    pub m: usize,
}

impl TrialParams {
    /// Full run settings for this trial.
    pub fn settings(&self, config: &StudyConfig, redis_url: &str) -> Settings {
        let index = IndexSettings::new(config.algorithm)
            .with_distance_metric(config.distance_metric)
            .with_vector_data_type(config.vector_data_type)
            .with_graph_params(self.ef_construction, self.ef_runtime, self.m);

        Settings::new(index, self.embedding.clone(), config.data_settings())
            .with_ret_k(self.ret_k)
            .with_redis_url(redis_url)
    }
}

/// Chooses the parameters of the next trial.
pub trait Sampler: Send {
    fn sample(&mut self, config: &StudyConfig) -> TrialParams;
}

/// Uniform sampling within each inclusive range.
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    fn pick(&mut self, (min, max): Range) -> usize {
        self.rng.gen_range(min..=max)
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, config: &StudyConfig) -> TrialParams {
        let idx = self.rng.gen_range(0..config.embedding_models.len());
        TrialParams {
            embedding: config.embedding_models[idx].clone(),
            ret_k: self.pick(config.ret_k),
            ef_runtime: self.pick(config.ef_runtime),
            ef_construction: self.pick(config.ef_construction),
            m: self.pick(config.m),
        }
    }
}

/// Supplies the components each trial runs against.
#[async_trait]
pub trait TrialBackend: Send + Sync {
    /// Redis URL recorded in trial settings.
    fn redis_url(&self) -> &str;

    fn store(&self) -> Arc<dyn VectorStore>;

    async fn embedder(&self, model: &EmbeddingModel) -> Result<Arc<dyn Embedder>>;
}

/// Redis-backed trials, with one embedder per model reused across trials.
pub struct LiveBackend {
    config: Config,
    store: Arc<RedisStore>,
    embedders: Mutex<HashMap<EmbeddingModel, Arc<dyn Embedder>>>,
}

impl LiveBackend {
    pub async fn connect(redis_url: &str, config: Config) -> Result<Self> {
        let store = RedisStore::connect(redis_url).await?;
        Ok(Self {
            config,
            store: Arc::new(store),
            embedders: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl TrialBackend for LiveBackend {
    fn redis_url(&self) -> &str {
        self.store.url()
    }

    fn store(&self) -> Arc<dyn VectorStore> {
        self.store.clone()
    }

    async fn embedder(&self, model: &EmbeddingModel) -> Result<Arc<dyn Embedder>> {
        // Held across creation so concurrent trials load each model once.
        let mut embedders = self.embedders.lock().await;
        if let Some(embedder) = embedders.get(model) {
            return Ok(embedder.clone());
        }

        let embedder = embeddings::create_embedder(model, &self.config).await?;
        embedders.insert(model.clone(), embedder.clone());
        Ok(embedder)
    }
}

/// Outcome of one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TrialResult {
    pub number: usize,
    pub test_id: RunId,
    pub params: TrialParams,
    pub metrics: RetrievalMetrics,
    pub threshold: Option<ThresholdResult>,
    pub avg_query_time_ms: f64,
    pub indexing_time_secs: f64,
    pub objective: f64,
}

/// Summary of a finished study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct StudyReport {
    pub study_id: RunId,
    pub metrics: Vec<MetricName>,
    pub weights: Vec<f64>,
    /// Trials in sampling order.
    pub trials: Vec<TrialResult>,
    /// Number of the trial with the highest objective.
    pub best_trial: Option<usize>,
    pub total_time_secs: f64,
}

impl StudyReport {
    fn new(config: &StudyConfig, mut trials: Vec<TrialResult>, total_time_secs: f64) -> Self {
        trials.sort_by_key(|t| t.number);
        let best_trial = select_best(&trials).map(|t| t.number);
        Self {
            study_id: config.study_id.clone(),
            metrics: config.metrics.clone(),
            weights: config.weights.clone(),
            trials,
            best_trial,
            total_time_secs,
        }
    }

    pub fn best(&self) -> Option<&TrialResult> {
        let number = self.best_trial?;
        self.trials.iter().find(|t| t.number == number)
    }

    /// Print summary to stdout.
    pub fn print_summary(&self) {
        println!("\n========== Study Results ==========");
        println!("Study:  {}", self.study_id);
        let objective: Vec<String> = self
            .metrics
            .iter()
            .zip(&self.weights)
            .map(|(m, w)| format!("{} x {}", w, m))
            .collect();
        println!("Objective: {}", objective.join(" + "));
        println!("Trials: {} ({:.1}s)", self.trials.len(), self.total_time_secs);
        println!("------------------------------------");
        println!(
            "{:>3}  {:<40} {:>4} {:>5} {:>5} {:>4}  {:>7} {:>7} {:>7}  {:>9}",
            "#", "model", "k", "efr", "efc", "m", "P@k", "R@k", "F1@k", "objective"
        );
        for t in &self.trials {
            let marker = if Some(t.number) == self.best_trial { "*" } else { " " };
            println!(
                "{:>3}{} {:<40} {:>4} {:>5} {:>5} {:>4}  {:>7.4} {:>7.4} {:>7.4}  {:>9.4}",
                t.number,
                marker,
                t.params.embedding.model,
                t.params.ret_k,
                t.params.ef_runtime,
                t.params.ef_construction,
                t.params.m,
                t.metrics.precision_at_k,
                t.metrics.recall_at_k,
                t.metrics.f1_at_k,
                t.objective
            );
        }
        if let Some(best) = self.best() {
            println!("------------------------------------");
            println!(
                "Best: trial {} ({}, k={}, ef_runtime={}, ef_construction={}, m={}) objective {:.4}",
                best.number,
                best.params.embedding.model,
                best.params.ret_k,
                best.params.ef_runtime,
                best.params.ef_construction,
                best.params.m,
                best.objective
            );
        }
        println!("====================================\n");
    }
}

/// Highest objective wins; the earliest trial wins ties.
fn select_best(trials: &[TrialResult]) -> Option<&TrialResult> {
    trials.iter().fold(None, |best: Option<&TrialResult>, t| match best {
        Some(b) if b.objective >= t.objective => Some(b),
        _ => Some(t),
    })
}

/// Key of the persisted study summary.
pub fn study_key(study_id: &RunId) -> String {
    format!("study:{}", study_id)
}

/// Runs trials and ranks them.
pub struct Study {
    config: StudyConfig,
    backend: Arc<dyn TrialBackend>,
    sampler: Box<dyn Sampler>,
}

impl Study {
    /// Validate `config` and connect to Redis.
    pub async fn new(config: StudyConfig, app_config: &Config) -> Result<Self> {
        config.validate()?;
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| app_config.redis.url.clone());
        let backend = LiveBackend::connect(&redis_url, app_config.clone()).await?;
        Self::with_backend(config, Arc::new(backend))
    }

    pub fn with_backend(config: StudyConfig, backend: Arc<dyn TrialBackend>) -> Result<Self> {
        config.validate()?;
        let sampler = Box::new(RandomSampler::new(config.seed));
        Ok(Self {
            config,
            backend,
            sampler,
        })
    }

    pub fn with_sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// Run every trial, persist the summary and return it.
    pub async fn run(&mut self) -> Result<StudyReport> {
        let start = Instant::now();
        let trial_params: Vec<TrialParams> = (0..self.config.n_trials)
            .map(|_| self.sampler.sample(&self.config))
            .collect();

        info!(
            study_id = %self.config.study_id,
            trials = self.config.n_trials,
            jobs = self.config.n_jobs,
            "Starting study"
        );

        let config = &self.config;
        let backend = &self.backend;
        let results = stream::iter(trial_params.into_iter().enumerate())
            .map(|(number, params)| run_trial(config, backend.as_ref(), number, params))
            .buffer_unordered(config.n_jobs)
            .collect::<Vec<_>>()
            .await;

        let trials = results.into_iter().collect::<Result<Vec<_>>>()?;
        let report = StudyReport::new(config, trials, start.elapsed().as_secs_f64());

        let key = study_key(&report.study_id);
        backend
            .store()
            .put_json(&key, &serde_json::to_value(&report)?)
            .await?;

        if let Some(best) = report.best() {
            info!(
                key = %key,
                best_trial = best.number,
                objective = best.objective,
                "Study complete"
            );
        }

        Ok(report)
    }
}

async fn run_trial(
    config: &StudyConfig,
    backend: &dyn TrialBackend,
    number: usize,
    params: TrialParams,
) -> Result<TrialResult> {
    debug!(trial = number, model = %params.embedding.model, "Starting trial");

    let settings = params.settings(config, backend.redis_url());
    let test_id = settings.test_id.clone();
    let embedder = backend.embedder(&params.embedding).await?;
    let eval =
        Eval::with_components(settings, config.find_threshold, embedder, backend.store()).await?;
    let report = eval.calc_metrics().await?;
    let objective = config.objective(&report);

    info!(
        trial = number,
        model = %params.embedding.model,
        ret_k = params.ret_k,
        objective,
        "Trial finished"
    );

    Ok(TrialResult {
        number,
        test_id,
        params,
        metrics: report.metrics.retrieval,
        threshold: report.metrics.threshold,
        avg_query_time_ms: report.metrics.latency.avg_query_time_ms,
        indexing_time_secs: report.metrics.latency.indexing_time_secs,
        objective,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;
    use crate::eval::{LatencyMetrics, MetricsSection, RunMetadata};
    use crate::settings::EmbeddingProvider;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    const STUDY_YAML: &str = r#"
raw_data_path: raw.json
labeled_data_path: labeled.json
embedding_models:
  - provider: hf
    model: sentence-transformers/all-MiniLM-L6-v2
    dim: 384
metrics: [precision_at_k, f1_at_k]
weights: [1.0, 2.0]
n_trials: 4
n_jobs: 2
"#;

    struct InMemoryBackend {
        store: MemoryStore,
    }

    #[async_trait]
    impl TrialBackend for InMemoryBackend {
        fn redis_url(&self) -> &str {
            "memory://"
        }

        fn store(&self) -> Arc<dyn VectorStore> {
            Arc::new(self.store.clone())
        }

        async fn embedder(&self, model: &EmbeddingModel) -> Result<Arc<dyn Embedder>> {
            Ok(Arc::new(MockEmbedder::new(model.model.clone(), model.dim)))
        }
    }

    fn report(precision: f64, f1: f64, latency: f64) -> EvalReport {
        EvalReport {
            metrics: MetricsSection {
                retrieval: RetrievalMetrics {
                    precision_at_k: precision,
                    recall_at_k: 1.0,
                    f1_at_k: f1,
                },
                threshold: None,
                latency: LatencyMetrics {
                    avg_query_time_ms: latency,
                    indexing_time_secs: 0.0,
                },
            },
            metadata: RunMetadata {
                test_id: RunId::new(),
                embedding_provider: EmbeddingProvider::Hf,
                embedding_model: "m".to_string(),
                embedding_dim: 4,
                algorithm: Algorithm::Flat,
                distance_metric: DistanceMetric::Cosine,
                vector_data_type: VectorDataType::Float32,
                ef_construction: 200,
                ef_runtime: 10,
                m: 16,
                ret_k: 1,
                num_queries: 1,
                num_docs: 1,
            },
        }
    }

    fn trial(number: usize, objective: f64) -> TrialResult {
        TrialResult {
            number,
            test_id: RunId::new(),
            params: TrialParams {
                embedding: EmbeddingModel::new(EmbeddingProvider::Hf, "m", 4),
                ret_k: 1,
                ef_runtime: 10,
                ef_construction: 100,
                m: 8,
            },
            metrics: RetrievalMetrics::default(),
            threshold: None,
            avg_query_time_ms: 0.0,
            indexing_time_secs: 0.0,
            objective,
        }
    }

    #[test]
    fn test_parse_with_defaults() {
        let config = StudyConfig::from_yaml(STUDY_YAML).unwrap();
        config.validate().unwrap();
        assert_eq!(config.ret_k, (1, 10));
        assert_eq!(config.ef_runtime, (10, 50));
        assert_eq!(config.ef_construction, (100, 300));
        assert_eq!(config.m, (8, 64));
        assert_eq!(config.algorithm, Algorithm::Hnsw);
        assert_eq!(config.input_data_type, InputDataType::Json);
        assert_eq!(config.metrics, vec![MetricName::PrecisionAtK, MetricName::F1AtK]);
    }

    #[test]
    fn test_weights_must_match_metrics() {
        let yaml = STUDY_YAML.replace("weights: [1.0, 2.0]", "weights: [1.0]");
        let config = StudyConfig::from_yaml(&yaml).unwrap();
        assert!(matches!(config.validate(), Err(OptimizeError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            ("n_trials: 4", "n_trials: 0"),
            ("n_jobs: 2", "n_jobs: 0"),
            ("n_jobs: 2", "n_jobs: 2\nm: [64, 8]"),
            ("n_jobs: 2", "n_jobs: 2\nret_k: [0, 3]"),
        ];
        for (from, to) in cases {
            let config = StudyConfig::from_yaml(&STUDY_YAML.replace(from, to)).unwrap();
            assert!(config.validate().is_err(), "accepted {}", to);
        }
    }

    #[test]
    fn test_unknown_metric_rejected() {
        let yaml = STUDY_YAML.replace("f1_at_k]", "ndcg]");
        assert!(StudyConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_sampler_respects_ranges_and_seed() {
        let mut config = StudyConfig::from_yaml(STUDY_YAML).unwrap();
        config.embedding_models.push(EmbeddingModel::new(
            EmbeddingProvider::OpenAi,
            "text-embedding-3-small",
            1536,
        ));

        let mut a = RandomSampler::new(Some(7));
        let mut b = RandomSampler::new(Some(7));
        for _ in 0..50 {
            let params = a.sample(&config);
            assert_eq!(params, b.sample(&config));
            assert!((1..=10).contains(&params.ret_k));
            assert!((10..=50).contains(&params.ef_runtime));
            assert!((100..=300).contains(&params.ef_construction));
            assert!((8..=64).contains(&params.m));
            assert!(config.embedding_models.contains(&params.embedding));
        }
    }

    #[test]
    fn test_objective_is_weighted_sum() {
        let mut config = StudyConfig::from_yaml(STUDY_YAML).unwrap();
        assert!((config.objective(&report(0.25, 0.4, 3.0)) - 1.05).abs() < 1e-12);

        config.metrics = vec![MetricName::F1AtK, MetricName::AvgQueryTimeMs];
        config.weights = vec![1.0, -0.1];
        assert!((config.objective(&report(0.25, 0.4, 3.0)) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_best_trial_first_wins_ties() {
        let trials = vec![trial(0, 0.5), trial(1, 0.9), trial(2, 0.9), trial(3, 0.1)];
        assert_eq!(select_best(&trials).unwrap().number, 1);
        assert!(select_best(&[]).is_none());
    }

    #[tokio::test]
    async fn test_study_end_to_end() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("raw.json"),
            r#"[{"item_id": "0", "text": "redis cache"}, {"item_id": "1", "text": "vector search"}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("labeled.json"),
            r#"[{"query": "redis cache", "relevant_item_ids": ["0"]},
                {"query": "vector search", "relevant_item_ids": ["1"]}]"#,
        )
        .unwrap();

        let mut config = StudyConfig::from_yaml(STUDY_YAML).unwrap();
        config.raw_data_path = dir.path().join("raw.json");
        config.labeled_data_path = dir.path().join("labeled.json");
        config.seed = Some(42);
        config.algorithm = Algorithm::Flat;

        let store = MemoryStore::new();
        let backend = Arc::new(InMemoryBackend {
            store: store.clone(),
        });
        let mut study = Study::with_backend(config.clone(), backend).unwrap();
        let report = study.run().await.unwrap();

        assert_eq!(report.trials.len(), 4);
        let numbers: Vec<usize> = report.trials.iter().map(|t| t.number).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
        for t in &report.trials {
            assert_eq!(t.metrics.recall_at_k, 1.0);
            let expected = t.metrics.precision_at_k + 2.0 * t.metrics.f1_at_k;
            assert!((t.objective - expected).abs() < 1e-12);
        }

        let best = report.best().unwrap();
        assert!(report.trials.iter().all(|t| t.objective <= best.objective));

        let persisted = store
            .get_json(&study_key(&config.study_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted["trials"].as_array().unwrap().len(), 4);
        assert_eq!(store.document_keys("rvl").await.len(), 2);
    }
}
