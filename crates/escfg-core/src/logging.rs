//! File logging for the configurator
//!
//! stdout belongs to the headless runner's NDJSON stream, so every layer here
//! writes to a daily file under the platform data dir instead.

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Variable that overrides the default filter, in `EnvFilter` syntax.
pub const LOG_ENV: &str = "ESCFG_LOG";

const LOG_FILE: &str = "escfg.log";

/// Our crates at info, dependencies only when they warn.
const DEFAULT_FILTER: &str = "esc_configurator=info,escfg_app=info,escfg_driver=info,warn";

/// Install the global subscriber.
///
/// Coordinator transitions log at `debug`, driver chatter at `trace`:
///
/// ```bash
/// ESCFG_LOG=escfg_app=debug escfg
/// ESCFG_LOG=escfg_driver=trace,escfg_app=debug escfg
/// ```
pub fn init() -> Result<()> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE);
    let file_layer = fmt::layer()
        .with_writer(appender)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(fmt::time::ChronoLocal::new(
            "%Y-%m-%d %H:%M:%S%.3f".to_string(),
        ));

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .init();

    tracing::info!(
        "ESC configurator {} logging to {}",
        env!("CARGO_PKG_VERSION"),
        log_file_path().display()
    );
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("esc-configurator")
        .join("logs")
}

/// Base path of the rolling log; the appender adds a date suffix.
pub fn log_file_path() -> PathBuf {
    log_directory().join(LOG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_lives_under_app_dir() {
        let path = log_file_path();
        assert!(path.ends_with("esc-configurator/logs/escfg.log"));
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(DEFAULT_FILTER.parse::<EnvFilter>().is_ok());
    }
}
