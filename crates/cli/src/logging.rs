use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILTER_ENV: &str = "REELPICK_LOG";
pub const LOG_FILE_ENV: &str = "REELPICK_LOG_FILE";

/// Installs the global subscriber: human-readable output on stderr plus an
/// optional plain-text file. The returned guard flushes the file writer when
/// dropped and must outlive all logging.
pub fn init_logger() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries command output (paths, JSON), so logs go to stderr.
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let (file_layer, guard) = match env::var_os(LOG_FILE_ENV) {
        Some(path) => match split_log_path(Path::new(&path)) {
            Some((dir, name)) => {
                let appender = tracing_appender::rolling::never(dir, name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer().with_writer(writer).with_ansi(false);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn split_log_path(path: &Path) -> Option<(&Path, &Path)> {
    let name = Path::new(path.file_name()?);
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Some((dir, name))
}
