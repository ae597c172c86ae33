//! Tracing setup.
//!
//! Logs go to `$PAPYRUS_HOME/logs/papyrus.log` so stdout stays free for
//! answers. When that file cannot be opened, stderr is used instead.

use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use crate::config::paths;

/// Environment variable holding a tracing filter directive.
pub const LOG_ENV: &str = "PAPYRUS_LOG";

pub const LOG_FILE_NAME: &str = "papyrus.log";

/// Installs the global subscriber.
///
/// `default_level` applies when `PAPYRUS_LOG` is unset. Keep the returned
/// guard alive until exit or buffered lines are lost.
pub fn init(default_level: &str) -> Result<WorkerGuard> {
    let filter = build_filter(std::env::var(LOG_ENV).ok().as_deref(), default_level);

    let (writer, guard) = match paths::logs_dir().and_then(|dir| file_appender(&dir)) {
        Ok(appender) => tracing_appender::non_blocking(appender),
        Err(_) => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;

    Ok(guard)
}

fn file_appender(dir: &Path) -> Result<RollingFileAppender> {
    fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_NAME)
        .build(dir)
        .map_err(|e| anyhow!("Failed to open log file in {}: {e}", dir.display()))
}

fn build_filter(env_directive: Option<&str>, default_level: &str) -> EnvFilter {
    env_directive
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level))
}
