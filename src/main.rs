// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use slotcam::config::{CaptureConfig, CapturePriority};
use slotcam::constants::app_info;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "slotcam")]
#[command(about = "Resolve and capture from logical camera slots")]
#[command(version = app_info::version())]
struct Cli {
    /// Config file (default: ~/.config/slotcam/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Requested capture width
    #[arg(long, global = true)]
    width: Option<u32>,

    /// Requested capture height
    #[arg(long, global = true)]
    height: Option<u32>,

    /// Requested capture frame rate
    #[arg(long, global = true)]
    fps: Option<f64>,

    /// Source priority: v4l2, libcamera or auto
    #[arg(long, global = true)]
    priority: Option<String>,

    /// Never retry device sources through GStreamer
    #[arg(long, global = true)]
    no_fallback: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List V4L2 capture devices
    List,

    /// Show the ordered candidate sources for each slot
    Candidates {
        /// Slots to show (default: 0 and 1)
        #[arg(short, long)]
        slot: Vec<u32>,
    },

    /// Resolve each slot and report which source works
    Probe {
        /// Slots to probe (default: 0 and 1)
        #[arg(short, long)]
        slot: Vec<u32>,
    },

    /// Save one frame from a slot or an explicit source
    Snapshot {
        #[arg(short, long, default_value = "0")]
        slot: u32,

        /// Source to use instead of the slot's candidates (index, /dev path or pipeline)
        #[arg(long)]
        source: Option<String>,

        /// Output file path (default: ~/Pictures/slotcam/snapshot_TIMESTAMP.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Stream from a slot and report frame statistics
    Watch {
        /// Slots to read (default: 0 and 1)
        #[arg(short, long)]
        slot: Vec<u32>,

        /// Duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=slotcam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::List => cli::list_devices(),
        Commands::Candidates { slot } => cli::show_candidates(&config, &slot),
        Commands::Probe { slot } => cli::probe(&config, &slot),
        Commands::Snapshot {
            slot,
            source,
            output,
        } => cli::snapshot(&config, slot, source.as_deref(), output),
        Commands::Watch { slot, duration } => cli::watch(&config, &slot, duration),
    }
}

/// Defaults, then config file, then environment, then flags
fn load_config(cli: &Cli) -> Result<CaptureConfig, Box<dyn std::error::Error>> {
    let mut config = CaptureConfig::load_or_default(cli.config.as_deref())?;
    config.apply_process_env();

    if let Some(width) = cli.width {
        config.capture_width = width;
    }
    if let Some(height) = cli.height {
        config.capture_height = height;
    }
    if let Some(fps) = cli.fps {
        config.capture_fps = fps;
    }
    if let Some(priority) = cli.priority.as_deref() {
        config.priority = CapturePriority::parse(priority);
    }
    if cli.no_fallback {
        config.generic_fallback = false;
    }

    Ok(config)
}
