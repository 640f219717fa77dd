//! Logging configuration for memberqa

use std::path::Path;

use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

use crate::config::LoggingConfig;
use crate::Result;

const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "memberqa.log";

/// Build the env filter: `RUST_LOG` wins, otherwise the configured level
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},memberqa={level}")))
}

/// Initialize logging from the `[logging]` config section
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    init_logging_with_level(&config.level, config.file)
}

/// Initialize logging with a custom level, optionally mirroring to a daily log file
pub fn init_logging_with_level(level: &str, with_file: bool) -> Result<()> {
    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);

    let file_layer = if with_file {
        let logs_dir = Path::new(LOG_DIR);
        if !logs_dir.exists() {
            std::fs::create_dir_all(logs_dir)?;
        }
        let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE_PREFIX);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // The guard flushes on drop; the process logs until exit.
        std::mem::forget(guard);
        Some(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(non_blocking)
                .with_ansi(false)
                .boxed(),
        )
    } else {
        None
    };

    Registry::default()
        .with(env_filter(level))
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!("Logging initialized with level: {}", level);
    if with_file {
        tracing::info!(
            "Log files will be saved to: {}/{}.YYYY-MM-DD",
            LOG_DIR,
            LOG_FILE_PREFIX
        );
    }

    Ok(())
}
