//! # lexrag CLI
//!
//! The `lexrag` binary ingests legal documents into a local SQLite store
//! and answers questions over them with citations.
//!
//! ## Usage
//!
//! ```bash
//! lexrag --config ./config/lexrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexrag init` | Create the SQLite database and run schema migrations |
//! | `lexrag ingest <paths…>` | Split, embed, and store files or directories |
//! | `lexrag documents` | List documents with their status |
//! | `lexrag get <id>` | Show a document and its chunks |
//! | `lexrag search "<query>"` | Nearest chunks by vector similarity |
//! | `lexrag chat "<question>"` | Answer a question with citations |
//! | `lexrag retry <id> <path>` | Re-run a failed ingestion |
//! | `lexrag delete <id>` | Remove a document, its chunks, and its vectors |
//! | `lexrag sweep` | Fail ingestions that never finished |
//!
//! Logs go to stderr and are controlled with `RUST_LOG`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lexrag::{app, config, db, get, ingest, migrate, search};

const DEFAULT_LOG_FILTER: &str = "lexrag=info,lexrag_core=info";

/// lexrag: retrieval-augmented question answering over legal documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lexrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lexrag",
    about = "Retrieval-augmented question answering over legal documents",
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
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest files or directories.
    ///
    /// Directories are walked recursively and filtered by the extensions
    /// in `[ingest].extensions`.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Document title. Only valid for a single file; defaults to the file stem.
        #[arg(long)]
        title: Option<String>,
    },

    /// List all documents.
    Documents,

    /// Show a document and its chunks.
    Get {
        /// Document id.
        id: String,
    },

    /// Search indexed chunks.
    Search {
        query: String,

        /// Number of results (defaults to `[retrieval].default_top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Metadata equality filter, repeatable (`document_id`, `chunk_id`,
        /// `position`, `title`, `source_ref`).
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,
    },

    /// Ask a question over the ingested documents.
    Chat { question: String },

    /// Re-run a failed ingestion with the text from `path`.
    Retry { id: String, path: PathBuf },

    /// Delete a document with its chunks and vectors.
    Delete { id: String },

    /// Mark ingestions stuck in `pending` or `processing` as failed.
    Sweep {
        /// Age threshold (defaults to `[ingest].stale_after_secs`).
        #[arg(long)]
        older_than_secs: Option<u64>,
    },
}

/// Parse a `key=value` pair for `--filter` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .try_init()
        .ok();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let pool = db::connect(&cfg).await?;
    migrate::run_migrations(&pool).await?;

    if let Commands::Init = cli.command {
        println!("Database initialized successfully.");
        pool.close().await;
        return Ok(());
    }

    let pipeline = app::build_pipeline(&cfg, pool.clone())?;

    let result = match cli.command {
        Commands::Init => Ok(()),
        Commands::Ingest { paths, title } => {
            ingest::run_ingest(&pipeline, &cfg, &paths, title).await
        }
        Commands::Documents => get::run_list(&pipeline).await,
        Commands::Get { id } => get::run_get(&pipeline, &id).await,
        Commands::Search {
            query,
            top_k,
            filters,
        } => {
            let top_k = top_k.unwrap_or(cfg.retrieval.default_top_k);
            search::run_search(&pipeline, &query, top_k, filters).await
        }
        Commands::Chat { question } => search::run_chat(&pipeline, &question).await,
        Commands::Retry { id, path } => ingest::run_retry(&pipeline, &id, &path).await,
        Commands::Delete { id } => get::run_delete(&pipeline, &id).await,
        Commands::Sweep { older_than_secs } => {
            let secs = older_than_secs.unwrap_or(cfg.ingest.stale_after_secs);
            get::run_sweep(&pipeline, secs).await
        }
    };

    pool.close().await;
    result
}
