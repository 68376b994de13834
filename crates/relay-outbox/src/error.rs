//! Outbox error types.

use thiserror::Error;

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Transport-level failure (connect, timeout, body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a status >= 400
    #[error("Endpoint rejected payload with HTTP {0}")]
    Status(u16),

    /// HTTP client could not be built
    #[error("Client error: {0}")]
    Client(String),
}

impl OutboxError {
    /// Status code carried by the error, if the endpoint answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            OutboxError::Status(code) => Some(*code),
            OutboxError::Http(e) => e.status().map(|s| s.as_u16()),
            OutboxError::Client(_) => None,
        }
    }
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
