//! Tracing setup for the harchiver binary.
//!
//! Events go to `$XDG_STATE_HOME/harchiver/harchiver.log`; when that file
//! cannot be opened the caller falls back to [`init_logging_stderr`]. The
//! filter comes from `HARCHIVER_LOG` (same syntax as `RUST_LOG`).

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "HARCHIVER_LOG";
const DEFAULT_FILTER: &str = "info,harchiver=debug,harchiver_core=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Location of the log file; creates the state directory.
pub fn log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("harchiver")?;
    let path = xdg_dirs
        .place_state_file("harchiver.log")
        .context("cannot create harchiver state directory")?;
    Ok(path)
}

/// Installs the global subscriber writing to the log file and returns its path.
/// Thread names are kept so writer-thread events stand apart from transfers.
pub fn init_logging() -> Result<PathBuf> {
    let path = log_path()?;
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    tracing::info!(path = %path.display(), version = env!("CARGO_PKG_VERSION"), "logging initialized");
    Ok(path)
}

/// Stderr-only subscriber. Does nothing if one is already installed.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .try_init();
}
