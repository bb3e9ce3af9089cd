//! Logging initialization using the `tracing` ecosystem.
//!
//! Provides:
//! - Console output, either human-readable or one JSON object per line
//! - File output (daily rotation via `tracing-appender`, non-blocking writer)
//! - Configurable log level via env var `RUST_LOG` or explicit parameter

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// Should be called once at program start. The returned guard owns the
/// background file writer; keep it alive until shutdown or buffered log
/// lines are lost.
///
/// # Parameters
///
/// - `log_level`: default filter if `RUST_LOG` env var is not set (e.g. `"info"`)
/// - `log_dir`: optional directory for daily-rotating log files
/// - `json`: emit console output as JSON lines
/// - `file_prefix`: log file prefix (e.g. `"tm-runner"`)
pub fn init_logging(
    log_level: &str,
    log_dir: Option<&str>,
    json: bool,
    file_prefix: &str,
) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, format!("{file_prefix}.log"));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let text_layer = (!json).then(|| fmt::layer().with_target(true).with_ansi(true));
    let json_layer = json.then(|| fmt::layer().json().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    guard
}
