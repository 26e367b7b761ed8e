//! Streamdrop CLI - streamdrop command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;
mod daemon;
mod locks;
mod logging;
mod settings;
mod util;

/// Streamdrop - Resumable chunked upload of growing files
#[derive(Parser)]
#[command(name = "streamdrop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML); defaults to ./streamdrop.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to a daily rotated file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Override the watched directory
    #[arg(long, global = true)]
    watch_dir: Option<PathBuf>,

    /// Override the checkpoint store URL
    #[arg(long, global = true)]
    redis_url: Option<String>,

    /// Override the chunk size in bytes
    #[arg(long, global = true)]
    chunk_size: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the directory and upload until interrupted
    Run,
    /// Show tracked streams and their progress
    Status,
    /// Upload a file's pending chunks once and exit
    Upload {
        /// File to upload
        file: PathBuf,
    },
    /// Write the manifest for a fully uploaded file now
    Finalize {
        /// File to finalize
        file: PathBuf,
    },
    /// Drop a file's checkpoint record
    Forget {
        /// File whose record is removed
        file: PathBuf,
    },
    /// Print the effective settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Held until exit so buffered log lines are flushed
    let _log_guard = logging::init(cli.log_file.as_deref())?;

    let overrides = settings::Overrides {
        watch_dir: cli.watch_dir,
        redis_url: cli.redis_url,
        chunk_size: cli.chunk_size,
    };
    let settings = settings::load(cli.config.as_deref(), &overrides)?;

    match cli.command {
        Commands::Run => daemon::run(settings).await,
        Commands::Status => cmd::status::run(&settings).await,
        Commands::Upload { file } => cmd::upload::run(&settings, &file).await,
        Commands::Finalize { file } => cmd::finalize::run(&settings, &file).await,
        Commands::Forget { file } => cmd::forget::run(&settings, &file).await,
        Commands::Config => cmd::config::run(&settings),
    }
}
