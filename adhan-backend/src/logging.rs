//! Console plus daily-rotated file logging
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Context;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MAX_LOG_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 3);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Keeps the file writer flushing; drop it last
#[allow(dead_code)]
pub struct LoggerGuard(WorkerGuard);

/// Lowercased level if known, `info` otherwise
pub fn normalize_level(level: &str) -> &'static str {
    let lowered = level.trim().to_ascii_lowercase();
    LEVELS
        .iter()
        .find(|known| **known == lowered)
        .copied()
        .unwrap_or("info")
}

fn env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    let directive = level
        .parse()
        .with_context(|| format!("Invalid log directive '{}'", level))?;
    Ok(EnvFilter::builder()
        .with_default_directive(directive)
        .parse_lossy(std::env::var("RUST_LOG").unwrap_or_default()))
}

/// Install the global subscriber. `RUST_LOG` overrides `level`.
pub fn init_logging(log_dir: impl AsRef<Path>, prefix: &str, level: &str) -> anyhow::Result<LoggerGuard> {
    let log_dir = log_dir.as_ref().to_path_buf();
    let normalized = normalize_level(level);

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(&log_dir)
        .with_context(|| format!("Failed to create log appender in {:?}", log_dir))?;
    let (writer, guard) = NonBlocking::new(file_appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(env_filter(normalized)?);
    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_filter(env_filter(normalized)?);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if normalized != level.trim().to_ascii_lowercase() {
        tracing::warn!("Unknown log level '{}', using '{}'", level, normalized);
    }

    spawn_log_cleanup(log_dir, prefix.to_string());
    Ok(LoggerGuard(guard))
}

fn spawn_log_cleanup(log_dir: PathBuf, prefix: String) {
    tokio::spawn(async move {
        loop {
            match remove_old_logs(&log_dir, &prefix, MAX_LOG_AGE, SystemTime::now()).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!("Removed {} old log file(s)", removed),
                Err(e) => tracing::warn!("Log cleanup failed: {:#}", e),
            }
            tokio::time::sleep(CLEANUP_INTERVAL).await;
        }
    });
}

/// Delete `{prefix}*.log` files last modified more than `max_age` before `now`
async fn remove_old_logs(log_dir: &Path, prefix: &str, max_age: Duration, now: SystemTime) -> anyhow::Result<usize> {
    let mut entries = tokio::fs::read_dir(log_dir)
        .await
        .with_context(|| format!("Failed to list {:?}", log_dir))?;
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(prefix) || !name.ends_with(".log") {
            continue;
        }

        let modified = entry.metadata().await?.modified()?;
        if now.duration_since(modified).unwrap_or_default() > max_age {
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("Failed to remove {:?}", path))?;
            removed += 1;
        }
    }
    Ok(removed)
}
