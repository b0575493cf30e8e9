//! # NeuroRAG CLI (`neurorag`)
//!
//! The `neurorag` binary builds the document index and answers questions
//! against it from the terminal or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! neurorag --config ./config/neurorag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `neurorag build` | Load, chunk and embed the data directory; persist the index |
//! | `neurorag search "<query>"` | Show the top-K chunks for a query |
//! | `neurorag ask "<question>"` | Answer one question |
//! | `neurorag chat` | Interactive question loop |
//! | `neurorag inspect` | Print index metadata |
//! | `neurorag serve` | Start the HTTP API |
//!
//! Commands that read the index require `--trust-index` (or
//! `index.trust_artifact = true` in the config file).

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use neurorag::config::{self, Config};
use neurorag::index::ArtifactTrust;
use neurorag::progress::ProgressMode;
use neurorag::{ask, ingest, inspect, search, server};

const DEFAULT_CONFIG: &str = "./config/neurorag.toml";

/// NeuroRAG: ask questions about a folder of documents.
///
/// Settings come from a TOML file (see `config/neurorag.example.toml`).
/// Credentials are read from the environment or a `.env` file.
#[derive(Parser)]
#[command(
    name = "neurorag",
    about = "NeuroRAG: retrieval-augmented question answering over your documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/neurorag.toml`; built-in defaults apply when
    /// that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or rebuild) the index from the data directory.
    ///
    /// Always starts from scratch. The previous index is replaced only
    /// after the new one has been written completely.
    Build {
        /// Data directory (overrides `data.dir`).
        #[arg(long)]
        data: Option<PathBuf>,

        /// Index directory (overrides `index.path`).
        #[arg(long)]
        index: Option<PathBuf>,

        /// Progress output on stderr: `auto`, `human`, `json`, or `off`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Retrieve the chunks nearest to a query.
    Search {
        query: String,

        /// Number of chunks to return (defaults to `retrieval.top_k`).
        #[arg(short)]
        k: Option<usize>,

        #[command(flatten)]
        trust: TrustArgs,
    },

    /// Answer a single question.
    Ask {
        question: String,

        /// Name recorded in the chat log.
        #[arg(long)]
        user: Option<String>,

        #[command(flatten)]
        trust: TrustArgs,
    },

    /// Interactive chat session on stdin.
    Chat {
        /// Name recorded in the chat log.
        #[arg(long)]
        user: Option<String>,

        #[command(flatten)]
        trust: TrustArgs,
    },

    /// Print the persisted index's metadata.
    Inspect {
        #[command(flatten)]
        trust: TrustArgs,
    },

    /// Start the HTTP API on `server.bind`.
    Serve {
        /// Bind address (overrides `server.bind`).
        #[arg(long)]
        bind: Option<String>,

        #[command(flatten)]
        trust: TrustArgs,
    },
}

#[derive(clap::Args)]
struct TrustArgs {
    /// Trust the persisted index at `index.path` and load it.
    #[arg(long)]
    trust_index: bool,
}

impl TrustArgs {
    fn resolve(&self, config: &Config) -> ArtifactTrust {
        ArtifactTrust::from_flag(self.trust_index || config.index.trust_artifact)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "neurorag=debug" } else { "neurorag=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn resolve_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => config::load_config(&path)
            .with_context(|| format!("loading config {}", path.display())),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG);
            if default.exists() {
                config::load_config(&default)
                    .with_context(|| format!("loading config {}", DEFAULT_CONFIG))
            } else {
                tracing::debug!("no config file at {}, using defaults", DEFAULT_CONFIG);
                Ok(Config::default())
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // A missing .env file is fine; credentials may already be exported.
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }

    let mut cfg = resolve_config(cli.config)?;

    match cli.command {
        Commands::Build {
            data,
            index,
            progress,
        } => {
            if let Some(dir) = data {
                cfg.data.dir = dir;
            }
            if let Some(path) = index {
                cfg.index.path = path;
            }
            let mode = ProgressMode::parse(&progress).ok_or_else(|| {
                anyhow::anyhow!(
                    "invalid --progress '{}': use auto, human, json, or off",
                    progress
                )
            })?;
            ingest::run_build(&cfg, mode.reporter().as_ref()).await?;
        }
        Commands::Search { query, k, trust } => {
            let trust = trust.resolve(&cfg);
            search::run_search(&cfg, &query, k, trust).await?;
        }
        Commands::Ask {
            question,
            user,
            trust,
        } => {
            let trust = trust.resolve(&cfg);
            ask::run_ask(&cfg, &question, user, trust).await?;
        }
        Commands::Chat { user, trust } => {
            let trust = trust.resolve(&cfg);
            ask::run_chat(&cfg, user, trust).await?;
        }
        Commands::Inspect { trust } => {
            let trust = trust.resolve(&cfg);
            inspect::run_inspect(&cfg, trust).await?;
        }
        Commands::Serve { bind, trust } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            let trust = trust.resolve(&cfg);
            let pipeline = ask::build_pipeline(&cfg, trust).await?;
            server::run_server(&cfg.server.bind, pipeline).await?;
        }
    }

    Ok(())
}
