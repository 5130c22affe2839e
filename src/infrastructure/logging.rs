//! Centralized file-based logging system
//!
//! Writes logs to files under the configured directory, separated by type:
//! - main/ - everything, JSON lines
//! - error/ - WARN and ERROR only
//! - flush/ - flush worker and sink activity

use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

use super::config::LoggingConfig;

const LOG_TYPES: [&str; 3] = ["main", "error", "flush"];

/// Initialize console and (optionally) file logging
///
/// Returns the appender guards, which must be kept alive for the duration
/// of the program or buffered lines are lost on exit.
pub fn init_logging(config: &LoggingConfig) -> io::Result<Vec<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);

    let mut guards = Vec::new();

    let file_layers = if config.file_output {
        prepare_log_dirs(&config.dir)?;

        let (main_appender, main_guard) = create_appender(&config.dir, "main");
        guards.push(main_guard);
        let (error_appender, error_guard) = create_appender(&config.dir, "error");
        guards.push(error_guard);
        let (flush_appender, flush_guard) = create_appender(&config.dir, "flush");
        guards.push(flush_guard);

        // Main log - all events
        let main_layer = tracing_subscriber::fmt::layer()
            .with_writer(main_appender)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true)
            .json();

        // Error log - WARN and above
        let error_layer = tracing_subscriber::fmt::layer()
            .with_writer(error_appender)
            .with_ansi(false)
            .with_target(true)
            .with_filter(tracing_subscriber::filter::LevelFilter::WARN);

        // Flush log - consumer side of the pipeline
        let flush_layer = tracing_subscriber::fmt::layer()
            .with_writer(flush_appender)
            .with_ansi(false)
            .with_target(true)
            .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
                is_flush_target(metadata.target())
            }));

        Some(main_layer.and_then(error_layer).and_then(flush_layer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layers)
        .with(console_layer)
        .init();

    if config.file_output {
        tracing::info!(dir = %config.dir.display(), "logging initialized");
    }

    Ok(guards)
}

/// Create the log directory and one subdirectory per log type
fn prepare_log_dirs(dir: &Path) -> io::Result<()> {
    for log_type in LOG_TYPES {
        fs::create_dir_all(dir.join(log_type))?;
    }
    Ok(())
}

fn is_flush_target(target: &str) -> bool {
    target.starts_with("flush") || target.starts_with("sink") || target.contains("flusher")
}

/// Create a daily rolling, non-blocking file appender
fn create_appender(dir: &Path, name: &str) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::new(Rotation::DAILY, dir.join(name), name);
    tracing_appender::non_blocking(appender)
}

/// Log macro helpers for specific log types
#[macro_export]
macro_rules! log_flush {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "flush", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_sink {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "sink", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_main {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "main", $level, $($arg)+)
    };
}
