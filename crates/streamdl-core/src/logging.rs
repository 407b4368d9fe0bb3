//! Tracing setup. Logs go to a file under the XDG state dir; callers fall
//! back to stderr when that is not possible.

use anyhow::{anyhow, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "info,streamdl=debug,streamdl_core=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// `~/.local/state/streamdl/streamdl.log`, creating the directory.
pub fn log_file_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("streamdl")?;
    Ok(xdg_dirs.place_state_file("streamdl.log")?)
}

/// Install the global subscriber writing to [`log_file_path`].
///
/// Returns an error when the file cannot be opened or a subscriber is already
/// installed; the CLI then calls [`init_logging_stderr`].
pub fn init_logging() -> Result<()> {
    let path = log_file_path()?;
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    // `&File` is `Write`, so an `Arc<File>` serves every event without cloning handles.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("install subscriber: {}", e))?;

    tracing::info!(path = %path.display(), "logging to file");
    Ok(())
}

/// Install a stderr-only subscriber. A no-op if one is already installed.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}
