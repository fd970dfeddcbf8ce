//! Logging Infrastructure
//!
//! Console logging plus, when a directory is given, daily rotating files:
//! - `app/`: everything except the `audit` target, 14 files kept
//! - `audit/`: user administration records, never pruned

use std::fs;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, filter::filter_fn, fmt, prelude::*};

/// Tracing target for administration records
pub const AUDIT_TARGET: &str = "audit";

/// Rotated application log files kept on disk
const APP_LOG_RETENTION: usize = 14;

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Log level (e.g., "info", "debug"); `RUST_LOG` takes precedence
/// * `json_format` - JSON console output instead of the pretty format
/// * `log_dir` - Optional directory for file logging
///
/// Fails if a global subscriber is already installed.
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_layer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    let (app_layer, audit_layer) = match log_dir {
        Some(dir) => {
            let app_dir = dir.join("app");
            let audit_dir = dir.join("audit");
            fs::create_dir_all(&app_dir)?;
            fs::create_dir_all(&audit_dir)?;

            let app_log = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("app")
                .filename_suffix("log")
                .max_log_files(APP_LOG_RETENTION)
                .build(app_dir)?;
            let audit_log = RollingFileAppender::new(Rotation::DAILY, audit_dir, "audit.log");

            let app_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_writer(std::sync::Mutex::new(app_log))
                .with_filter(filter_fn(|meta| meta.target() != AUDIT_TARGET));
            let audit_layer = fmt::layer()
                .json()
                .with_target(false)
                .with_writer(std::sync::Mutex::new(audit_log))
                .with_filter(filter_fn(|meta| meta.target() == AUDIT_TARGET));
            (Some(app_layer), Some(audit_layer))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(app_layer)
        .with(audit_layer)
        .try_init()?;

    Ok(())
}

/// Initialize the logging system (console only)
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_logging_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        // Another test may already own the global subscriber; directories are
        // created before installation either way.
        let _ = init_logger_with_file("debug", false, Some(dir.path()));

        assert!(dir.path().join("app").is_dir());
        assert!(dir.path().join("audit").is_dir());
    }
}
