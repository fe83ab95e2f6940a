use clap::{Parser, Subcommand};
use doc_qa::commands::{ask_question, ingest_documents, run_chat, search_index, show_status};
use doc_qa::config::{Config, get_config_dir, run_interactive_config, show_config};
use doc_qa::{QaError, Result};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "doc-qa")]
#[command(about = "Ask questions about your documents using local retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to ~/.doc-qa)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Extract, chunk and embed documents into the index
    Ingest {
        /// PDF, text or Markdown files, or directories containing them
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Discard the existing index before ingesting
        #[arg(long)]
        clear: bool,
        /// Index file to use instead of the configured one
        #[arg(long)]
        index: Option<PathBuf>,
    },
    /// Answer a single question
    Ask {
        /// The question to answer
        question: String,
        /// Index file to use instead of the configured one
        #[arg(long)]
        index: Option<PathBuf>,
    },
    /// Start an interactive question and answer session
    Chat {
        /// Index file to use instead of the configured one
        #[arg(long)]
        index: Option<PathBuf>,
    },
    /// Show the index records closest to a query
    Search {
        /// Text to search for
        query: String,
        /// Number of results (defaults to the configured top_k)
        #[arg(short, long)]
        k: Option<usize>,
        /// Index file to use instead of the configured one
        #[arg(long)]
        index: Option<PathBuf>,
    },
    /// Show index statistics and Ollama connectivity
    Status {
        /// Index file to use instead of the configured one
        #[arg(long)]
        index: Option<PathBuf>,
    },
}

fn load_config(config_dir: &Path) -> Result<Config> {
    let config = Config::load(config_dir)?;
    config
        .validate()
        .map_err(|e| QaError::Config(e.to_string()))?;
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir().map_err(|e| QaError::Config(e.to_string()))?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&load_config(&config_dir)?)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Ingest {
            paths,
            clear,
            index,
        } => {
            let config = load_config(&config_dir)?;
            let index_path = index.unwrap_or_else(|| config.vector_store_path());
            ingest_documents(&config, &paths, &index_path, clear)?;
        }
        Commands::Ask { question, index } => {
            let config = load_config(&config_dir)?;
            let index_path = index.unwrap_or_else(|| config.vector_store_path());
            ask_question(&config, &index_path, &question)?;
        }
        Commands::Chat { index } => {
            let config = load_config(&config_dir)?;
            let index_path = index.unwrap_or_else(|| config.vector_store_path());
            run_chat(&config, &index_path)?;
        }
        Commands::Search { query, k, index } => {
            let config = load_config(&config_dir)?;
            let index_path = index.unwrap_or_else(|| config.vector_store_path());
            let k = k.unwrap_or(config.retrieval.top_k);
            search_index(&config, &index_path, &query, k)?;
        }
        Commands::Status { index } => {
            let config = load_config(&config_dir)?;
            let index_path = index.unwrap_or_else(|| config.vector_store_path());
            show_status(&config, &index_path)?;
        }
    }

    Ok(())
}
