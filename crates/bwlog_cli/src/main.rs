//! bwlog CLI
//!
//! Command-line tools for reading bwlog log roots.
//!
//! # Commands
//!
//! - `query` - Search one user's log
//! - `inspect` - Display root statistics and metadata
//! - `users` - List users with logs
//! - `strings` - List the format string catalog

mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::FileConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// bwlog command-line log tools.
#[derive(Parser)]
#[command(name = "bwlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the log root
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// TOML config file with a [message_logger] table
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search one user's log
    Query(commands::query::QueryArgs),

    /// Display root statistics and metadata
    Inspect {
        /// Show per-segment details
        #[arg(short, long)]
        segments: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List users with logs
    Users {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List the format string catalog
    Strings {
        /// Only strings matching this regex
        #[arg(short, long)]
        grep: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let file_config = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let root = || config::resolve_root(cli.path.clone(), &file_config);

    match cli.command {
        Commands::Query(args) => {
            commands::query::run(&root()?, &args)?;
        }
        Commands::Inspect { segments, format } => {
            commands::inspect::run(&root()?, &file_config, segments, &format)?;
        }
        Commands::Users { format } => {
            commands::users::run(&root()?, &format)?;
        }
        Commands::Strings { grep, format } => {
            commands::strings::run(&root()?, grep.as_deref(), &format)?;
        }
        Commands::Version => {
            println!("bwlog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("bwlog core v{}", bwlog_core::VERSION);
            println!("log format v{}", bwlog_core::LOG_FORMAT_VERSION);
        }
    }

    Ok(())
}
