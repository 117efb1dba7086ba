//! Kino Monitor CLI - Headless Telemetry Pipeline Tool
//!
//! Features:
//! - Replay scripted player sessions through the trackers
//! - Validate blocked segment lists
//! - Timestamp conversion

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod script;

/// Kino Monitor CLI - Player telemetry toolkit
#[derive(Parser)]
#[command(name = "kino-monitor")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Replay and inspect player telemetry sessions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted player session
    Replay {
        /// Path to the session script (JSON)
        script: PathBuf,

        /// Monitor configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check blocked segments and positions against them
    Segments {
        /// Ranges as start:end pairs, e.g. 10:20,30:40
        #[arg(short, long)]
        ranges: String,

        /// Positions to check
        #[arg(allow_negative_numbers = true)]
        positions: Vec<f64>,
    },

    /// Convert seconds since the epoch to milliseconds
    Millis {
        /// Values in seconds
        #[arg(required = true, allow_negative_numbers = true)]
        seconds: Vec<f64>,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);
    kino_monitor::init();

    match cli.command {
        Commands::Replay { script, config } => {
            commands::replay(&script, config.as_deref(), &cli.format).await?;
        }
        Commands::Segments { ranges, positions } => {
            commands::segments(&ranges, &positions, &cli.format)?;
        }
        Commands::Millis { seconds } => {
            commands::millis(&seconds, &cli.format)?;
        }
    }

    Ok(())
}
