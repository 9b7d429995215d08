//! Retrieval Optimizer CLI
//!
//! Evaluate and tune embedding-based vector search configurations.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use retrieval_optimizer::{
    Config, Eval, MemoryStore, RedisStore, RunId, StudyConfig, VectorStore, embeddings,
    fetch_report,
    persistence::{save_eval_report, save_study_report},
    settings::{
        Algorithm, DataSettings, DistanceMetric, EmbeddingProvider, EmbeddingSettings,
        IndexSettings, InputDataType, Settings, VectorDataType,
    },
    study::Study,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Retrieval Optimizer - evaluate and tune vector search configurations
#[derive(Parser)]
#[command(name = "retrieval-optimizer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single evaluation and store its result
    Eval(EvalArgs),

    /// Search over embedding models and index parameters
    Study {
        /// Path to the study config (YAML)
        config: PathBuf,

        /// Also write the study report locally (.json or .bin)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print a stored evaluation result
    Show {
        /// Run identifier printed by `eval`
        run_id: String,

        /// Redis URL (defaults to the configured one)
        #[arg(long)]
        redis_url: Option<String>,

        /// Print the summary instead of raw JSON
        #[arg(long)]
        summary: bool,
    },
}

#[derive(Args)]
struct EvalArgs {
    /// Raw corpus file
    #[arg(long)]
    raw: PathBuf,

    /// Labeled queries file
    #[arg(long)]
    labeled: PathBuf,

    #[arg(long, value_enum, default_value_t = InputDataType::Json)]
    input_type: InputDataType,

    #[arg(long, value_enum, default_value_t = EmbeddingProvider::Hf)]
    provider: EmbeddingProvider,

    /// Embedding model identifier
    #[arg(long, default_value = "sentence-transformers/all-MiniLM-L6-v2")]
    model: String,

    /// Embedding dimension
    #[arg(long, default_value_t = 384)]
    dim: usize,

    #[arg(long, value_enum, default_value_t = Algorithm::Flat)]
    algorithm: Algorithm,

    #[arg(long, value_enum, default_value_t = DistanceMetric::Cosine)]
    metric: DistanceMetric,

    #[arg(long, value_enum, default_value_t = VectorDataType::Float32)]
    vector_type: VectorDataType,

    /// Number of results per query
    #[arg(short = 'k', long, default_value_t = 1)]
    ret_k: usize,

    #[arg(long, default_value_t = 200)]
    ef_construction: usize,

    #[arg(long, default_value_t = 10)]
    ef_runtime: usize,

    #[arg(long, default_value_t = 16)]
    m: usize,

    /// Also search for the best distance threshold
    #[arg(long)]
    find_threshold: bool,

    /// Redis URL (defaults to the configured one)
    #[arg(long)]
    redis_url: Option<String>,

    /// Use an in-process store instead of Redis
    #[arg(long)]
    in_memory: bool,

    /// Also write the report locally (.json or .bin)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Eval(args) => cmd_eval(args).await,
        Commands::Study { config, output } => cmd_study(config, output).await,
        Commands::Show {
            run_id,
            redis_url,
            summary,
        } => cmd_show(run_id, redis_url, summary).await,
    }
}

async fn cmd_eval(args: EvalArgs) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let redis_url = args.redis_url.unwrap_or_else(|| config.redis.url.clone());

    let index = IndexSettings::new(args.algorithm)
        .with_distance_metric(args.metric)
        .with_vector_data_type(args.vector_type)
        .with_graph_params(args.ef_construction, args.ef_runtime, args.m);
    let settings = Settings::new(
        index,
        EmbeddingSettings::new(args.provider, args.model, args.dim),
        DataSettings::new(args.raw, args.labeled, args.input_type),
    )
    .with_ret_k(args.ret_k)
    .with_redis_url(redis_url);

    println!("Run: {}", settings.test_id);
    println!(
        "Model: {} ({}, dim {})",
        settings.embedding.model, settings.embedding.provider, settings.embedding.dim
    );

    let start = Instant::now();

    let eval = if args.in_memory {
        settings.validate().context("Invalid settings")?;
        let embedder = embeddings::create_embedder(&settings.embedding, &config)
            .await
            .context("Failed to create embedder")?;
        Eval::with_components(
            settings,
            args.find_threshold,
            embedder,
            Arc::new(MemoryStore::new()),
        )
        .await
        .context("Failed to prepare index")?
    } else {
        Eval::new(settings, args.find_threshold, &config)
            .await
            .context("Failed to prepare index")?
    };

    let report = eval
        .calc_metrics()
        .await
        .context("Failed to compute metrics")?;

    report.print_summary();
    println!("Finished in {:.2?}", start.elapsed());
    println!("Result stored at: {}", eval.test_id().result_key());

    if let Some(output) = args.output {
        save_eval_report(&report, &output).context("Failed to save report")?;
        println!("Report saved to: {}", output.display());
    }

    Ok(())
}

async fn cmd_study(config_path: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let study_config = StudyConfig::load(&config_path)
        .with_context(|| format!("Failed to load study config '{}'", config_path.display()))?;

    println!("Study: {}", study_config.study_id);
    println!(
        "Trials: {} ({} at a time) over {} model(s)",
        study_config.n_trials,
        study_config.n_jobs,
        study_config.embedding_models.len()
    );

    let mut study = Study::new(study_config, &config)
        .await
        .context("Failed to start study")?;
    let report = study.run().await.context("Study failed")?;

    report.print_summary();

    if let Some(output) = output {
        save_study_report(&report, &output).context("Failed to save study report")?;
        println!("Study report saved to: {}", output.display());
    }

    Ok(())
}

async fn cmd_show(run_id: String, redis_url: Option<String>, summary: bool) -> Result<()> {
    let url = match redis_url {
        Some(url) => url,
        None => {
            Config::load()
                .context("Failed to load configuration")?
                .redis
                .url
        }
    };

    let store = RedisStore::connect(&url)
        .await
        .context("Failed to connect to Redis")?;
    let run_id = RunId::from_string(run_id);

    if summary {
        let report = fetch_report(&store, &run_id)
            .await
            .context("Failed to fetch result")?;
        report.print_summary();
    } else {
        let key = run_id.result_key();
        match store.get_json(&key).await.context("Failed to fetch result")? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => anyhow::bail!("No result stored at '{}'", key),
        }
    }

    Ok(())
}
