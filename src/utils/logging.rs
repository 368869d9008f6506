use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{Environment, LoggingSettings};

const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Local wall-clock timestamps, e.g. `16-10-2026 09:15:02`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTimer;

impl FormatTime for LogTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format(TIMESTAMP_FORMAT))
    }
}

/// Keeps the non-blocking file writers alive. Dropping it flushes and
/// stops the background logging threads, so hold it for the whole run.
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
    pub log_dir: PathBuf,
}

/// Initialize tracing with console output and file appenders.
///
/// Logs are written to:
/// - stdout
/// - `{dir}/log.{date}.log`, rotated daily, the last `max_files` kept
/// - `{dir}/error_log.log`, warnings and errors only, appended forever
///
/// `RUST_LOG` takes priority over the configured filter.
pub fn init_tracing(settings: &LoggingSettings, environment: Environment) -> Result<LogGuard> {
    let log_dir = PathBuf::from(&settings.dir);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("log")
        .filename_suffix("log")
        .max_log_files(settings.max_files.max(1))
        .build(&log_dir)
        .context("Failed to create rolling log appender")?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let error_appender = tracing_appender::rolling::never(&log_dir, "error_log.log");
    let (error_writer, error_guard) = tracing_appender::non_blocking(error_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.filter_for(environment)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_timer(LogTimer)
                .with_ansi(environment == Environment::Local)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_timer(LogTimer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(error_writer)
                .with_timer(LogTimer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_filter(LevelFilter::WARN),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard {
        _guards: vec![file_guard, error_guard],
        log_dir,
    })
}

/// Pretty-print a JSON value for the request/response dumps.
///
/// serde_json never escapes non-ASCII, so payloads stay readable UTF-8.
pub fn pretty_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unserializable: {}>", e))
}
