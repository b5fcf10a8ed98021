//! # memdex CLI
//!
//! ```bash
//! memdex --config ./config/memdex.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `memdex init` | Create the SQLite database and run schema migrations |
//! | `memdex sync [--full]` | Index new and changed documents, drop deleted ones |
//! | `memdex search "<query>"` | Hybrid search over indexed chunks |
//! | `memdex status` | Counts per source label, embedding model, DB size |
//! | `memdex get <chunk_id>` | Print one stored chunk |
//! | `memdex serve` | Start the HTTP server |
//!
//! `--json` switches every command to structured JSON on stdout. Logs go to
//! stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use memdex::{config, get, ingest, logging, migrate, search, server, stats};

/// memdex: hybrid search over agent memory files.
#[derive(Parser)]
#[command(
    name = "memdex",
    about = "Local hybrid-search index for agent memory files and session transcripts",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/memdex.toml")]
    config: PathBuf,

    /// Print structured JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Bring the index up to date with the document roots.
    ///
    /// Only documents whose fingerprint changed are re-embedded. A failed
    /// sync leaves the index untouched and prints a failed report.
    Sync {
        /// Reindex every document, ignoring fingerprints.
        #[arg(long)]
        full: bool,
    },

    /// Search indexed memory.
    Search {
        /// Search query text.
        query: String,

        /// Maximum number of results (default: `[retrieval].max_results`).
        #[arg(long)]
        max_results: Option<usize>,

        /// Drop results scoring below this (default: `[retrieval].min_score`).
        #[arg(long)]
        min_score: Option<f64>,

        /// Only return chunks with this source label.
        #[arg(long)]
        source: Option<String>,

        /// Include the vector/text score breakdown.
        #[arg(long)]
        explain: bool,
    },

    /// Show index statistics.
    Status,

    /// Print a stored chunk by id (`path::ordinal`).
    Get { chunk_id: String },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = match config::load_config(&cli.config) {
        Ok(cfg) => cfg,
        // Sync always answers with a report, even when the config is unusable.
        Err(e) if matches!(cli.command, Commands::Sync { .. }) => {
            ingest::print_report(&ingest::config_failure(&e), cli.json)?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "status": "ok", "db_path": cfg.db.path.display().to_string() })
                );
            } else {
                println!("Database initialized at {}", cfg.db.path.display());
            }
        }
        Commands::Sync { full } => {
            ingest::run_sync_command(&cfg, full, cli.json).await?;
        }
        Commands::Search {
            query,
            max_results,
            min_score,
            source,
            explain,
        } => {
            let opts = search::SearchOptions {
                query,
                max_results,
                min_score,
                source,
                explain,
            };
            search::run_search(&cfg, opts, cli.json).await?;
        }
        Commands::Status => {
            stats::run_status(&cfg, cli.json).await?;
        }
        Commands::Get { chunk_id } => {
            get::run_get(&cfg, &chunk_id, cli.json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
