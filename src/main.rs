// SPDX-License-Identifier: GPL-3.0-only

use capture::backends::camera::{DevicePosition, FlashMode, FocusMode, TorchMode};
use capture::constants::SessionPreset;
use clap::{Parser, Subcommand};

mod cli;

#[derive(Parser)]
#[command(name = "capture")]
#[command(about = "Camera capture session driver")]
#[command(version = capture::constants::app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Set up a session and stream frames
    Run {
        /// Camera to use: back or front (default from config)
        #[arg(short, long)]
        position: Option<DevicePosition>,

        /// Session preset: low, medium, high, uhd, photo (default from config)
        #[arg(long)]
        preset: Option<SessionPreset>,

        /// Number of frames to receive before stopping
        #[arg(short = 'n', long, default_value = "30")]
        frames: u64,

        /// Give up after this many seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Flash mode: off, on, auto
        #[arg(long)]
        flash: Option<FlashMode>,

        /// Torch mode: off, on, auto
        #[arg(long)]
        torch: Option<TorchMode>,

        /// Focus mode: locked, auto, continuous
        #[arg(long)]
        focus: Option<FocusMode>,
    },

    /// Set up a session with camera access denied by the user
    Deny,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=capture=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => cli::list_cameras(),
        Commands::Run {
            position,
            preset,
            frames,
            timeout,
            flash,
            torch,
            focus,
        } => cli::run_session(cli::RunOptions {
            position,
            preset,
            frames,
            timeout: std::time::Duration::from_secs(timeout),
            flash,
            torch,
            focus,
        }),
        Commands::Deny => cli::denied_session(),
    }
}
