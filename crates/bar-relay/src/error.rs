//! Error types for the relay.

use relay_outbox::OutboxError;
use thiserror::Error;

/// Relay error type.
#[derive(Error, Debug)]
pub enum RelayError {
    /// IO error (socket, file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Input parsed but is not a usable event
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identity could not be resolved or stored
    #[error("Identity error: {0}")]
    Identity(String),

    /// Listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Record file could not be opened or written
    #[error("Recording error: {0}")]
    Recording(String),

    /// Replay file could not be read
    #[error("Replay error: {0}")]
    Replay(String),

    /// Delivery setup error
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
