//! Logging infrastructure for screentime-mcp
//!
//! Logs never go to stdout, which carries the stdio MCP transport. They are
//! appended to a log file when one is configured (or named by the
//! `MCP_LOG_FILE` environment variable) and written to stderr otherwise.

use crate::config::LoggingConfig;
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Environment variable consulted when no log file is configured
pub const LOG_FILE_ENV: &str = "MCP_LOG_FILE";

/// Initialize the logging system
///
/// Sets up tracing with:
/// - File or stderr output through a non-blocking writer
/// - Plain text or JSON lines
/// - Configurable log level via config or RUST_LOG env var
pub fn init(config: &LoggingConfig) -> crate::error::Result<LoggingGuard> {
    let destination = log_destination(config);

    let (non_blocking, guard) = match &destination {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    // Build the filter from config or env var
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();
    }

    tracing::info!(
        destination = %destination
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stderr".to_string()),
        level = %config.level,
        json = config.json,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Initialize logging for tests (logs to the test writer)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any pending log writes.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Returns the log file to write to, if any.
///
/// The configured file wins over `MCP_LOG_FILE`.
pub fn log_destination(config: &LoggingConfig) -> Option<PathBuf> {
    config.file.clone().or_else(|| {
        std::env::var_os(LOG_FILE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_file_wins() {
        let config = LoggingConfig {
            file: Some(PathBuf::from("/tmp/screentime-mcp.log")),
            ..Default::default()
        };
        assert_eq!(
            log_destination(&config),
            Some(PathBuf::from("/tmp/screentime-mcp.log"))
        );
    }
}
