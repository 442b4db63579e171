//! Global `tracing` subscribers for hosts that have none of their own.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directive applying `level` to everything, this crate included.
fn directive(level: &tracing::Level) -> String {
    format!("{level},stagehand={level}")
}

fn filter(level: &tracing::Level) -> Result<EnvFilter> {
    Ok(EnvFilter::builder().parse(directive(level))?)
}

/// Opens `path` for appending, creating it and its directory if missing.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}

/// Sends every event at `level` or above to stdout.
///
/// Fails if a global subscriber is already installed.
pub fn init_stdout(level: &tracing::Level) -> Result<()> {
    let layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_filter(filter(level)?);
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Appends every event at `level` or above to the file at `path`, with
/// thread ids and source locations. Earlier runs' output is kept.
///
/// Fails if the file cannot be opened or a global subscriber is already
/// installed.
pub fn init_file(path: impl AsRef<Path>, level: &tracing::Level) -> Result<()> {
    let file = open_log_file(path.as_ref())?;
    let layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_filter(filter(level)?);
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
