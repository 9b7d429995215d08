//! Retrieval Optimizer - evaluate and tune vector search configurations.
//!
//! Given a corpus of raw text items and a set of labeled queries, this crate
//! embeds the corpus into a Redis Stack vector index, runs every query and
//! scores the results with pooled precision@k, recall@k and F1@k.
//!
//! # Overview
//!
//! 1. [`Settings`] describe one run: embedding model, index algorithm and
//!    parameters, data files and `k`.
//! 2. [`Eval`] prepares the shared index, rebuilding and repopulating it only
//!    when its identity (algorithm, metric, element type, dimension and graph
//!    parameters) changed since the last run.
//! 3. [`Eval::calc_metrics`] runs the queries and persists a result document
//!    at `eval:<test_id>`.
//! 4. A [`Study`] samples many settings and ranks them by a weighted objective.
//!
//! # Quick Start
//!
//! ```no_run
//! use retrieval_optimizer::{
//!     Config, Eval,
//!     settings::{
//!         Algorithm, DataSettings, EmbeddingProvider, EmbeddingSettings, IndexSettings,
//!         InputDataType, Settings,
//!     },
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!
//!     let settings = Settings::new(
//!         IndexSettings::new(Algorithm::Flat),
//!         EmbeddingSettings::new(
//!             EmbeddingProvider::Hf,
//!             "sentence-transformers/all-MiniLM-L6-v2",
//!             384,
//!         ),
//!         DataSettings::new("data/raw.json", "data/labeled.json", InputDataType::Json),
//!     )
//!     .with_ret_k(4);
//!
//!     let eval = Eval::new(settings, false, &config).await?;
//!     let report = eval.calc_metrics().await?;
//!     report.print_summary();
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **settings / config**: typed run settings and application configuration
//! - **data**: raw and labeled data loading (JSON or JSON Lines)
//! - **embeddings**: `Embedder` trait with local, OpenAI-compatible and mock providers
//! - **index / store**: index identity and the `VectorStore` trait (Redis or in-memory)
//! - **metrics**: pooled retrieval metrics and distance threshold search
//! - **eval / study**: single runs and parameter searches

pub mod config;
pub mod data;
pub mod embeddings;
pub mod error;
pub mod eval;
pub mod index;
pub mod metrics;
pub mod persistence;
pub mod settings;
pub mod store;
pub mod study;

// Re-export commonly used types
pub use config::Config;
pub use embeddings::Embedder;
pub use error::{OptimizeError, Result};
pub use eval::{Eval, EvalReport, fetch_report};
pub use metrics::RetrievalMetrics;
pub use persistence::{load_study_report, save_eval_report, save_study_report};
pub use settings::{RunId, Settings};
pub use store::{MemoryStore, RedisStore, VectorStore};
pub use study::{Study, StudyConfig, StudyReport};
