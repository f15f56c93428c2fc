//! Logging setup for the CLI.
//!
//! Stderr always receives formatted events so stdout stays clean for JSON
//! output. When a log directory is configured (`--log-dir` or
//! `TAB_DEDUP_LOG_DIR`) events are also written to a daily rolling file.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEBUG_ENV: &str = "TAB_DEDUP_DEBUG_LOG";
const LOG_DIR_ENV: &str = "TAB_DEDUP_LOG_DIR";
const LOG_FILE_PREFIX: &str = "tab-dedup.log";

/// Installs the global subscriber. Keep the returned guard alive until exit or
/// buffered file output is lost.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let log_dir = log_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(LOG_DIR_ENV).map(PathBuf::from));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
            let result = tracing_subscriber::registry()
                .with(env_filter())
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
            result.ok().map(|_| guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(env_filter())
                .with(stderr_layer)
                .try_init();
            None
        }
    }
}

fn env_filter() -> EnvFilter {
    match std::env::var(DEBUG_ENV).as_deref() {
        Ok("1" | "true" | "TRUE" | "yes" | "YES") => EnvFilter::new("debug"),
        _ => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}
