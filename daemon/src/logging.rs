//! Logging setup: `RUST_LOG`-filtered output to stderr plus a daily rolling
//! file in the app data directory. Display processes run with null stdio,
//! so the file is the only place their logs end up.
use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::paths;

const DEFAULT_LOG_FILTER: &str = "info";

/// Installs the global subscriber. Keep the returned guard alive for the
/// life of the process or buffered file output is lost.
pub fn init() -> anyhow::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let log_dir = paths::log_dir();
    let (file_layer, guard) = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = rolling::daily(&log_dir, paths::LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("Cannot create log directory {}: {e}", log_dir.display());
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to set tracing subscriber")?;

    tracing::debug!(pid = std::process::id(), "Logging to {}", log_dir.display());
    Ok(guard)
}
