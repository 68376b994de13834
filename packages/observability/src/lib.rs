//! # Observability
//!
//! Process-wide tracing setup for the relay binaries.
//!
//! Binaries call `observability::init_with_config()` once at startup and use
//! the standard `tracing` macros everywhere else. Library crates never install
//! a subscriber themselves.
//!
//! Output goes to stderr in compact form. When `log_path` is set, every event
//! is also appended to that file as one JSON object per line:
//!
//! - `tail -f relay.jsonl | jq` for pretty JSON
//! - `lnav relay.jsonl` for interactive exploration
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "bar-relay".into(),
//!     default_level: "debug".into(),
//!     log_path: Some("relay.jsonl".into()),
//!     ..Default::default()
//! });
//! ```

mod file_sink;
mod json_layer;

pub use file_sink::AppendLogWriter;
pub use json_layer::{JsonLayer, LogEntry};

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, written into every JSONL line.
    pub service_name: String,

    /// Default level filter (e.g., "debug", "info").
    /// Overridden by the `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional JSONL log file.
    pub log_path: Option<PathBuf>,

    /// Emit compact logs to stderr. Forced on when no log file is configured.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize with custom configuration.
///
/// A log file that cannot be opened is reported once on stderr and logging
/// continues on stderr only. Calling this twice is a no-op.
pub fn init_with_config(config: LogConfig) {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let (file_layer, file_error) = match &config.log_path {
        Some(path) => match AppendLogWriter::new(path) {
            Ok(writer) => (
                Some(JsonLayer::new(config.service_name.clone(), writer).with_filter(filter())),
                None,
            ),
            Err(e) => (None, Some(format!("{}: {}", path.display(), e))),
        },
        None => (None, None),
    };

    let stderr_layer = (config.also_stderr || file_layer.is_none()).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter())
    });

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if !installed {
        return;
    }

    match (file_error, &config.log_path) {
        (Some(error), _) => tracing::warn!(error = %error, "Log file unavailable, logging to stderr only"),
        (None, Some(path)) => tracing::debug!(log_path = %path.display(), "observability initialized"),
        (None, None) => {}
    }
}
