use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use topicsift::articles::{parse_items, Item};
use topicsift::config::{Config, EmbedderBackend};
use topicsift::db::VectorCache;
use topicsift::embeddings::EmbeddingProvider;
use topicsift::filter::{ClusterScope, FilterPipeline, OutputPolicy};
use topicsift::output::terminal;
use topicsift::topics::{load_topics, AnchorCache, AnchorSet, PrecomputedAnchors};

/// topicsift: embedding-based relevance prefilter for article digests.
///
/// Scores candidate articles against configured topics, drops the
/// irrelevant ones, and folds near-duplicates into a single representative.
#[derive(Parser)]
#[command(name = "topicsift", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the embedding cache database
    Init,

    /// Download the local ONNX embedding model (~90 MB)
    DownloadModel,

    /// Embed the topic queries and write a precomputed anchors file
    ExportAnchors {
        /// Where to write the anchors JSON
        #[arg(long)]
        output: PathBuf,

        /// Topics file (default: TOPICSIFT_TOPICS_FILE, topics.txt, topics.example.txt)
        #[arg(long)]
        topics_file: Option<PathBuf>,
    },

    /// Filter a JSON array of articles
    Filter {
        /// Input JSON file, or `-` for stdin
        input: String,

        /// Write filtered JSON here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Seed for cluster seeding (reproducible output)
        #[arg(long)]
        seed: Option<u64>,

        /// Relevance threshold (overrides TOPICSIFT_THRESHOLD)
        #[arg(long)]
        threshold: Option<f64>,

        /// Enable near-duplicate clustering at this similarity
        #[arg(long)]
        cluster_threshold: Option<f64>,

        /// Max items surfaced or peer-linked per cluster or topic
        #[arg(long)]
        max_cluster_size: Option<usize>,

        /// Cluster across all topics instead of per topic
        #[arg(long)]
        global: bool,

        /// Also emit the capped members after each cluster kernel
        #[arg(long)]
        surface_members: bool,

        /// Skip the embedding cache database
        #[arg(long)]
        no_cache: bool,

        /// Topics file (default: TOPICSIFT_TOPICS_FILE, topics.txt, topics.example.txt)
        #[arg(long)]
        topics_file: Option<PathBuf>,
    },

    /// List configured topics
    Topics {
        #[arg(long)]
        topics_file: Option<PathBuf>,
    },

    /// Show embedding cache statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Logs go to stderr so filtered JSON on stdout stays clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("topicsift=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            info!("Initializing topicsift database...");
            let config = Config::load()?;
            let db = topicsift::db::initialize_sqlite(&config.db_path)?;
            let table_count = db.table_count().await?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\ntopicsift is ready. Next step: set up your .env file");
            println!("  (OPENAI_API_KEY, or TOPICSIFT_EMBEDDER=onnx with download-model)");
        }

        Commands::DownloadModel => {
            let config = Config::load()?;
            let model_dir = &config.model_dir;

            println!("Downloading ONNX embedding model...");
            println!("  Destination: {}", model_dir.display());

            topicsift::embeddings::download::download_model(model_dir).await?;

            println!("\n{}", "Model downloaded successfully.".bold());
            println!("Set TOPICSIFT_EMBEDDER=onnx to use it.");
        }

        Commands::ExportAnchors {
            output,
            topics_file,
        } => {
            let config = Config::load()?;
            config.require_embedder()?;
            let provider = create_embedder(&config)?;
            let topics = load_topics(topics_file.or(config.topics_file.clone()).as_deref())?;
            let anchors = AnchorSet::new(topics, Arc::new(AnchorCache::new()));

            println!("Embedding {} topic queries...", anchors.query_strings().len());
            let embeddings = anchors.embed_queries(provider.as_ref()).await?;

            let file = PrecomputedAnchors {
                model: provider.model_id().to_string(),
                threshold: Some(config.threshold),
                queries: anchors.query_strings(),
                embeddings,
            };
            file.write(&output)?;
            println!(
                "Wrote {} anchor embeddings to {}",
                file.embeddings.len(),
                output.display()
            );
            println!("Set TOPICSIFT_ANCHORS_FILE={} to use them.", output.display());
        }

        Commands::Filter {
            input,
            output,
            seed,
            threshold,
            cluster_threshold,
            max_cluster_size,
            global,
            surface_members,
            no_cache,
            topics_file,
        } => {
            let mut config = Config::load()?;
            if let Some(t) = threshold {
                config.threshold = t;
            }
            if cluster_threshold.is_some() {
                config.cluster_threshold = cluster_threshold;
            }
            if let Some(n) = max_cluster_size {
                config.max_cluster_size = n;
            }
            if global {
                config.cluster_scope = ClusterScope::Global;
            }
            if topics_file.is_some() {
                config.topics_file = topics_file;
            }
            config.validate()?;

            let items = read_items(&input)?;
            let pipeline = build_pipeline(&config, surface_members, no_cache)?;

            let mut rng = match seed.or(config.seed) {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };

            let outcome = pipeline.filter_with_stats(items, &mut rng).await;
            let json = serde_json::to_string_pretty(&outcome.items)?;

            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    terminal::display_filtered(&outcome.items);
                    terminal::display_stats(&outcome.stats);
                    println!("Wrote {} items to {}", outcome.items.len(), path.display());
                }
                None => println!("{json}"),
            }
        }

        Commands::Topics { topics_file } => {
            let config = Config::load()?;
            let topics = load_topics(topics_file.or(config.topics_file).as_deref())?;
            terminal::display_topics(&topics);
        }

        Commands::Status => {
            let config = Config::load()?;
            let db = topicsift::db::open_sqlite(&config.db_path)?;
            println!("\n{}", "=== Embedding Cache ===".bold());
            println!("  Database: {}", config.db_path);
            let counts = db.count_by_model().await?;
            if counts.is_empty() {
                println!("  No cached vectors yet.");
            }
            for (model, count) in counts {
                println!("  {:<32} {:>8} vectors", model, count);
            }
        }
    }

    Ok(())
}

/// Read the article snapshot from a file or stdin.
fn read_items(input: &str) -> Result<Vec<Item>> {
    let raw = if input == "-" {
        std::io::read_to_string(std::io::stdin()).context("Failed to read articles from stdin")?
    } else {
        std::fs::read_to_string(Path::new(input))
            .with_context(|| format!("Failed to read articles from {input}"))?
    };
    let items = parse_items(&raw)?;
    info!(count = items.len(), "Loaded articles");
    Ok(items)
}

/// Wire provider, anchors, and cache into a pipeline.
///
/// Backend failures once the pipeline runs degrade to passing items through;
/// a backend that cannot even be constructed is reported here.
fn build_pipeline(config: &Config, surface_members: bool, no_cache: bool) -> Result<FilterPipeline> {
    let provider = create_embedder(config)?;
    let topics = load_topics(config.topics_file.as_deref())?;

    let mut anchors = AnchorSet::new(topics, Arc::new(AnchorCache::new()));
    if let Some(path) = &config.anchors_file {
        anchors = anchors.with_precomputed_file(path, provider.model_id(), config.threshold);
    }

    let mut filter_config = config.filter_config();
    if let OutputPolicy::Cluster {
        surface_members: surface,
        ..
    } = &mut filter_config.policy
    {
        *surface = surface_members;
    }

    let mut pipeline = FilterPipeline::new(provider, anchors, filter_config);
    if !no_cache {
        if let Some(cache) = open_cache(config) {
            pipeline = pipeline.with_cache(cache);
        }
    }
    Ok(pipeline)
}

/// Open the embedding cache, running without one if the database is unusable.
fn open_cache(config: &Config) -> Option<Arc<dyn VectorCache>> {
    match topicsift::db::initialize_sqlite(&config.db_path) {
        Ok(cache) => Some(cache as Arc<dyn VectorCache>),
        Err(e) => {
            warn!(error = %e, db = %config.db_path, "Embedding cache unavailable, continuing without it");
            None
        }
    }
}

/// Create an embedding provider based on the configured backend.
fn create_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedder {
        EmbedderBackend::Onnx => {
            info!("Using local ONNX embedder");
            let dir = topicsift::embeddings::download::embedding_model_dir(&config.model_dir);
            let embedder = topicsift::embeddings::onnx::OnnxEmbedder::load(&dir, config.batch_size)?;
            Ok(Arc::new(embedder))
        }
        EmbedderBackend::OpenAi => {
            info!(model = %config.model, "Using OpenAI embeddings API");
            let embedder = topicsift::embeddings::openai::OpenAiEmbedder::new(
                &config.openai_base_url,
                config.openai_api_key.clone(),
                config.model.clone(),
                config.batch_size,
            )?;
            Ok(Arc::new(embedder))
        }
    }
}
