//! Logging setup.
//!
//! The TUI owns the terminal, so everything goes to
//! `~/.config/vaultterm/debug.log` instead of stderr.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config;

const LOG_FILE: &str = "debug.log";

pub fn log_path() -> Result<PathBuf> {
    config::config_dir().map(|dir| dir.join(LOG_FILE))
}

/// Installs the global subscriber. `RUST_LOG` overrides the level chosen by `debug`.
pub fn init(debug: bool, path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {:?}", path))?;

    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", config::APP_NAME, default_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        "session started at {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}
