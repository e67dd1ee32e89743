//! Logging setup for a2a-relay using tracing.

use anyhow::Result;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with a daily file and console output.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// life of the process.
pub fn init(verbose: bool) -> Result<(WorkerGuard, PathBuf)> {
    let log_dir = get_log_dir()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "a2a-relay.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = if verbose {
        "info,a2a_relay=debug"
    } else {
        "warn,a2a_relay=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    tracing::debug!("Log directory: {}", log_dir.display());

    Ok((guard, log_dir))
}

/// Get the log directory path.
pub fn get_log_dir() -> Result<PathBuf> {
    let home = directories::ProjectDirs::from("com", "a2a-relay", "a2a-relay")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

    Ok(home.data_dir().join("logs"))
}

/// Initialize logging for tests (console only, no file). Safe to call
/// from every test.
#[cfg(test)]
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}
