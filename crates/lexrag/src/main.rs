//! # LexRAG CLI
//!
//! The `lexrag` binary is the interface to the engine: database
//! initialization, corpus ingestion, embedding backfill, retrieval, and
//! question answering.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexrag init` | Create the SQLite database and run schema migrations |
//! | `lexrag sync` | Chunk and embed the corpus directory (incremental) |
//! | `lexrag embed pending` | Backfill missing or stale-model embeddings |
//! | `lexrag embed rebuild` | Delete and regenerate all embeddings |
//! | `lexrag search "<query>"` | Retrieve ranked chunks without generation |
//! | `lexrag ask "<question>"` | Retrieve and generate a cited answer |
//! | `lexrag stats` | Show index counts and embedding coverage |
//!
//! ## Examples
//!
//! ```bash
//! lexrag init --config ./config/lexrag.toml
//! lexrag sync --config ./config/lexrag.toml
//! lexrag search "налог на имущество" --limit 10
//! lexrag ask "какая ставка налога на имущество?"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lexrag::config::{self, Config};
use lexrag::db;
use lexrag::embed_cmd;
use lexrag::embedder::create_embedder;
use lexrag::llm::create_llm;
use lexrag::migrate;
use lexrag::sqlite_store::SqliteStore;
use lexrag::stats;
use lexrag::sync;

use lexrag_core::generate::Generator;
use lexrag_core::retrieve::{RetrievalStrategy, Retriever};

/// LexRAG — retrieval-augmented question answering over a corpus of
/// legal text documents.
#[derive(Parser)]
#[command(
    name = "lexrag",
    about = "Retrieval-augmented question answering over a corpus of legal text documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lexrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest the corpus directory: chunk, embed, store.
    ///
    /// Incremental by default — unchanged documents are skipped and
    /// documents removed from the corpus are deleted from the index.
    Sync {
        /// Re-process every document regardless of its stored revision.
        #[arg(long)]
        full: bool,
    },

    /// Manage embeddings.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Retrieve ranked chunks for a query (no generation).
    Search {
        query: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the indexed corpus, with citations.
    Ask {
        question: String,

        /// Number of chunks to retrieve as evidence.
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index counts and embedding coverage.
    Stats,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks missing a current-model vector.
    Pending,
    /// Delete all vectors and regenerate them.
    Rebuild,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Sync { full } => run_sync(&config, full).await,
        Commands::Embed { action } => run_embed(&config, action).await,
        Commands::Search { query, limit, json } => run_search(&config, &query, limit, json).await,
        Commands::Ask {
            question,
            top_k,
            json,
        } => run_ask(&config, &question, top_k, json).await,
        Commands::Stats => run_stats(&config).await,
    }
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    let pool = db::connect(&config.db.path).await?;
    Ok(SqliteStore::new(pool))
}

async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    println!("init");
    println!("  database: {}", config.db.path.display());
    println!("ok");
    pool.close().await;
    Ok(())
}

async fn run_sync(config: &Config, full: bool) -> Result<()> {
    let store = open_store(config).await?;
    let embedder = create_embedder(&config.embedding)?;

    let report = sync::run_sync(config, &store, embedder.as_ref(), full).await?;

    println!("sync");
    println!("  scanned:  {} files", report.scanned);
    println!("  upserted: {} documents", report.upserted);
    println!("  skipped:  {} unchanged", report.skipped);
    println!("  deleted:  {} vanished", report.deleted);
    println!("  chunks:   {} written", report.chunks_written);
    if config.embedding.is_enabled() {
        println!("  embedded: {}", report.chunks_embedded);
        println!("  pending:  {}", report.chunks_pending);
    }
    println!("ok");
    Ok(())
}

async fn run_embed(config: &Config, action: EmbedAction) -> Result<()> {
    let store = open_store(config).await?;
    let embedder = create_embedder(&config.embedding)?;

    let (name, report) = match action {
        EmbedAction::Pending => (
            "embed pending",
            embed_cmd::run_embed_pending(config, &store, embedder.as_ref()).await?,
        ),
        EmbedAction::Rebuild => (
            "embed rebuild",
            embed_cmd::run_embed_rebuild(config, &store, embedder.as_ref()).await?,
        ),
    };

    println!("{name}");
    println!("  pending:  {}", report.pending);
    println!("  embedded: {}", report.embedded);
    println!("  failed:   {}", report.failed);
    println!("ok");
    Ok(())
}

async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let store = Arc::new(open_store(config).await?);
    let embedder = create_embedder(&config.embedding)?;
    let retriever = Retriever::new(store, embedder, config.retrieval_params()?)?;

    let top_k = limit.unwrap_or(config.retrieval.top_k);
    let result = retriever.retrieve(query, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let mode = match result.strategy {
        RetrievalStrategy::Hybrid => "hybrid",
        RetrievalStrategy::KeywordOnly => "keyword-only",
    };
    println!("search ({mode}): {} results", result.hits.len());
    for hit in &result.hits {
        let preview: String = hit.chunk.text.chars().take(120).collect();
        println!(
            "  [{}] {:.3}  {} (chunk {}, chars {}-{})",
            hit.label,
            hit.score,
            hit.chunk.document_id,
            hit.chunk.chunk_index,
            hit.chunk.start_char,
            hit.chunk.end_char
        );
        println!("      {preview}");
    }
    Ok(())
}

async fn run_ask(config: &Config, question: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let store = Arc::new(open_store(config).await?);
    let embedder = create_embedder(&config.embedding)?;
    let retriever = Retriever::new(store, embedder, config.retrieval_params()?)?;
    let generator = Generator::new(create_llm(&config.llm)?, config.generation_params()?)?;

    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let retrieval = retriever.retrieve(question, top_k).await?;
    let answer = generator.generate(question, &retrieval).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("{}", answer.answer);
    if !answer.citations.is_empty() {
        println!();
        println!("Sources:");
        for c in &answer.citations {
            println!(
                "  [{}] {} (chunk {}, chars {}-{})",
                c.label, c.document_id, c.chunk_index, c.start_char, c.end_char
            );
        }
    }
    if !answer.grounding_violations.is_empty() {
        println!();
        println!(
            "Note: removed citations with no matching source: {:?}",
            answer.grounding_violations
        );
    }
    if answer.evidence {
        println!();
        println!("confidence: {:.2}", answer.confidence);
    }
    Ok(())
}

async fn run_stats(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    stats::run_stats(config, &store).await
}
