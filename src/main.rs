// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "depth-bridge")]
#[command(about = "Depth camera to host runtime bridge")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Configuration file (default: <config dir>/depth-bridge/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported frame rates
    Modes,

    /// Print the effective configuration
    Config,

    /// Capture from the simulated camera and report delivery statistics
    Capture {
        /// Frame-rate key (5, 10 or 15; default from config)
        #[arg(short, long)]
        rate: Option<u32>,

        /// Capture duration in seconds
        #[arg(short, long, default_value = "3")]
        seconds: u64,

        /// Stop after this many frames
        #[arg(short, long)]
        frames: Option<u64>,

        /// Record per-frame delivery timing
        #[arg(short, long)]
        timing: bool,

        /// Deliver on a dispatch thread instead of the driver thread
        #[arg(short, long)]
        queued: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=depth_bridge=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Modes => cli::list_modes(),
        Commands::Config => cli::show_config(config),
        Commands::Capture {
            rate,
            seconds,
            frames,
            timing,
            queued,
        } => cli::capture(
            cli::CaptureOptions {
                rate,
                seconds,
                frames,
                timing,
                queued,
            },
            config,
        ),
    }
}
