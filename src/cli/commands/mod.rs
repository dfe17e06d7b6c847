//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod extract;
mod status;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use doctext::config::Config;
use doctext::ocr::ExtractOptions;

#[derive(Parser)]
#[command(name = "doctext")]
#[command(about = "Extract text from PDFs, Word documents and scanned images")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Stop OCR after this many seconds; remaining pages are marked as errors
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from a PDF, DOC, DOCX, text or image file
    Extract {
        /// Document to read
        file: PathBuf,
        /// Print a JSON object instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// OCR several page images of one document, in order
    Images {
        /// Page images
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show which OCR engines are available
    Status {
        /// Print a JSON object instead of a table
        #[arg(long)]
        json: bool,
    },
}

async fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from_path(&path).await.map_err(anyhow::Error::msg),
        None => Ok(Config::load().await),
    }
}

/// Options cancelled by Ctrl-C or by the `--timeout` deadline.
fn extract_options(timeout: Option<u64>) -> ExtractOptions {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, skipping remaining pages");
            on_signal.cancel();
        }
    });

    let options = ExtractOptions::default().with_cancel(token);
    match timeout {
        Some(secs) => options.with_timeout(Duration::from_secs(secs)),
        None => options,
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config).await?;
    if let Some(path) = &config.source_path {
        tracing::info!("Loaded config from {}", path.display());
    }

    match cli.command {
        Commands::Extract { file, json } => {
            extract::cmd_extract(&config, &file, json, extract_options(cli.timeout)).await
        }
        Commands::Images { files } => {
            extract::cmd_images(&config, files, extract_options(cli.timeout)).await
        }
        Commands::Status { json } => status::cmd_status(&config, json).await,
    }
}
