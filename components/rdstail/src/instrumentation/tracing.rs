// Local crates
use crate::helpers::load_config::{LogFormat, LoggingConfig};

// External crates
use anyhow::{Context, Result};
use std::panic;
use tracing::error;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt,
    prelude::*,
    registry::Registry,
};

const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_FILE_PREFIX: &str = "rdstail.log";

/// Install the global subscriber.
///
/// Diagnostics never go to stdout, which carries the tailed log data. They are
/// written to stderr, or to a daily rolling file under `log_dir` when one is
/// configured. `RUST_LOG` overrides the configured level.
///
/// The returned guard flushes buffered output when dropped and must be kept
/// alive for the life of the process.
pub fn init_tracing(logging: &LoggingConfig) -> Result<WorkerGuard> {
    let (writer, guard) = match &logging.log_dir {
        Some(dir) => tracing_appender::non_blocking(rolling::daily(dir, LOG_FILE_PREFIX)),
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    let ansi = logging.log_dir.is_none();

    let level = logging.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (pretty_layer, json_layer) = match logging.log_format {
        LogFormat::Pretty => (
            Some(
                fmt::layer()
                    .with_ansi(ansi)
                    .with_writer(writer)
                    .with_target(false)
                    .with_timer(fmt::time::UtcTime::rfc_3339()),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_target(false)
                    .with_timer(fmt::time::UtcTime::rfc_3339()),
            ),
        ),
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(pretty_layer)
        .with(json_layer)
        .with(ErrorLayer::default());

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    Ok(guard)
}

pub fn init_panic_handler() {
    panic::set_hook(Box::new(|panic_info| {
        let msg = match panic_info.payload().downcast_ref::<&str>() {
            Some(s) => (*s).to_string(),
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => s.clone(),
                None => "Unknown panic".to_string(),
            },
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            message = %msg,
            location = %location,
            "Application panicked!"
        );
        eprintln!("rdstail panicked at {location}: {msg}");
    }));
}
