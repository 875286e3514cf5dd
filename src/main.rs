//! gpuq - Single-host GPU job queue
//!
//! CLI entry point. The shell-facing process only re-execs itself detached;
//! everything else (enqueueing, coordinator election, scheduling) happens in
//! the detached phase.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use eyre::{Context, Result};
use tracing::debug;

use gpuq::bootstrap;
use gpuq::cli::Cli;
use gpuq::config::Config;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gpuq")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to a log file, not stdout/stderr: the detached process shares
    // the caller's terminal only for the enqueue confirmation line
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("gpuq.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    Ok(())
}

fn main() -> Result<()> {
    let mut argv: Vec<String> = std::env::args().collect();

    // Phase 1: the shell-facing invocation hands off to a detached copy of
    // itself and exits immediately with status 0
    if !argv.iter().any(|a| a == bootstrap::RELAUNCH_MARKER) {
        bootstrap::relaunch_detached(&argv[1..])?;
        return Ok(());
    }

    // Phase 2: detached
    bootstrap::strip_marker(&mut argv);
    let cli = Cli::parse_from(&argv);

    setup_logging().context("Failed to setup logging")?;

    let config = Config::load(None).context("Failed to load configuration")?;
    debug!(queue = %config.queue_file.display(), "gpuq starting");

    bootstrap::run(&config, &cli.command)
}
