use std::fs;
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "crawlwatch=info";

/// Daily rolling file under `log_dir` plus stderr. With the terminal UI up,
/// stderr only gets errors so the screen is not overwritten.
///
/// The returned guard flushes the file writer on drop; keep it alive in `run`.
pub fn init(log_dir: &Path, tui_mode: bool) -> io::Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "crawlwatch.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if tui_mode {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .try_init()
        .map_err(io::Error::other)?;

    Ok(guard)
}
