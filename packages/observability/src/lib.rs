//! # Observability
//!
//! Logging setup for the run telemetry binaries.
//!
//! Binaries call [`init_with_config`] once at startup and use the standard
//! `tracing` macros everywhere else. Libraries never install a subscriber.
//!
//! - Without a `log_path`, events go to stderr in compact form.
//! - With a `log_path`, events are appended to that file as JSONL
//!   (`tail -f runs.jsonl | jq`), optionally mirrored to stderr.
//!
//! `RUST_LOG` always wins over `default_level`.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "run-telemetry".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! })?;
//! ```

mod file_writer;
mod json_layer;

use std::path::PathBuf;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use file_writer::LogFileWriter;
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name written into every JSONL line.
    pub service_name: String,

    /// Default filter (e.g. "info", "run_metadata_streamer=debug").
    /// Overridden by `RUST_LOG`.
    pub default_level: String,

    /// JSONL log file. `None` logs to stderr only.
    pub log_path: Option<PathBuf>,

    /// Mirror events to stderr when writing to a file.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum InitError {
    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize logging with default settings.
pub fn init(service_name: &str) -> Result<(), InitError> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Initialize logging with custom configuration.
pub fn init_with_config(config: LogConfig) -> Result<(), InitError> {
    let Some(log_path) = config.log_path.clone() else {
        return tracing_subscriber::fmt()
            .with_env_filter(env_filter(&config.default_level))
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .try_init()
            .map_err(|e| InitError::AlreadyInitialized(e.to_string()));
    };

    let writer = LogFileWriter::open(&log_path).map_err(|source| InitError::LogFile {
        path: log_path.clone(),
        source,
    })?;
    let json_layer = JsonLayer::new(config.service_name.clone(), writer);

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    tracing_subscriber::registry()
        .with(json_layer.with_filter(env_filter(&config.default_level)))
        .with(stderr_layer)
        .try_init()
        .map_err(|e| InitError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        log_path = %log_path.display(),
        "observability initialized"
    );
    Ok(())
}
