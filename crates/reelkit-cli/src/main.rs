//! Reelkit CLI - headless companion for the reelkit player core
//!
//! Features:
//! - Source classification and embed id extraction
//! - Quality ladder normalization
//! - SDK script URL resolution
//! - SDK script reachability check

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

use output::OutputFormat;

/// Reelkit CLI - video player backend toolkit
#[derive(Parser)]
#[command(name = "reelkit")]
#[command(version)]
#[command(about = "Inspect sources, quality ladders and SDK scripts for reelkit players", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by the script commands
#[derive(clap::Args, Debug, Clone)]
pub struct ScriptArgs {
    /// Player config as JSON (file path); flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Pin the hls.js version
    #[arg(long)]
    pub hls_version: Option<String>,

    /// Pin the dash.js version
    #[arg(long)]
    pub dash_version: Option<String>,

    /// CDN base URL
    #[arg(long)]
    pub cdn: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide which backend plays a source
    Classify {
        /// File URL, manifest URL or video id
        file: String,

        /// Explicit source type (native, hls, dash, youtube, vimeo)
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Normalize a list of quality labels
    Ladder {
        /// Labels as supplied by the sources (e.g. 720p 1080p 480p)
        #[arg(required = true)]
        labels: Vec<String>,

        /// Preferred label, used when offered
        #[arg(short, long)]
        prefer: Option<String>,
    },

    /// Show the SDK script URLs a player would load
    Scripts {
        #[command(flatten)]
        args: ScriptArgs,
    },

    /// Fetch every SDK script once and report reachability
    Fetch {
        #[command(flatten)]
        args: ScriptArgs,

        /// Per-request timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();
    reelkit_core::init();

    match cli.command {
        Commands::Classify { file, kind } => {
            commands::classify(&file, kind.as_deref(), cli.format)?;
        }
        Commands::Ladder { labels, prefer } => {
            commands::ladder(labels, prefer, cli.format)?;
        }
        Commands::Scripts { args } => {
            commands::scripts(&args, cli.format)?;
        }
        Commands::Fetch { args, timeout } => {
            commands::fetch(&args, timeout, cli.format).await?;
        }
    }

    Ok(())
}
