//! Logging system configuration and initialization
//!
//! Console output through tracing-subscriber with an env-filter, plus
//! optional daily-rolling file output. The non-blocking file writer guard
//! must outlive the process, so it is parked in a static.

use anyhow::Result;
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
};

use crate::infrastructure::config::{app_data_dir, LoggingConfig};

// Keeps the non-blocking writer alive for the lifetime of the process
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Log directory: configured location or `<data dir>/logs`
fn log_directory(config: &LoggingConfig) -> PathBuf {
    config
        .log_dir
        .clone()
        .unwrap_or_else(|| app_data_dir().join("logs"))
}

/// Initialize the logging system. Safe to call once at process start.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let console_layer = fmt::layer().with_target(true);

    if config.file_output {
        let log_dir = log_directory(config);
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = rolling::daily(&log_dir, "jobharvest.log");
        let (writer, guard) = non_blocking(file_appender);
        if let Ok(mut guards) = LOG_GUARDS.lock() {
            guards.push(guard);
        }

        let file_layer = fmt::layer().with_ansi(false).with_writer(writer);

        Registry::default()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()?;
        tracing::info!("📁 File logging enabled: {}", log_dir.display());
    } else {
        Registry::default()
            .with(filter)
            .with(console_layer)
            .try_init()?;
    }

    Ok(())
}
