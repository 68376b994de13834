//! Outbound HTTP transport.

use crate::{OutboxError, OutboxResult};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Default endpoint for pushed events.
pub const DEFAULT_ENDPOINT_URL: &str = "https://barapi.bobmitch.com/push";

/// One outbound call for an already-serialized payload.
///
/// Implementations return the response status; classification into
/// success or retryable failure happens in [`check_status`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: &[u8]) -> OutboxResult<u16>;
}

/// Classify a transport result: any status >= 400 is a failure.
pub fn check_status(result: OutboxResult<u16>) -> OutboxResult<u16> {
    match result {
        Ok(status) if status >= 400 => Err(OutboxError::Status(status)),
        other => other,
    }
}

/// Sender configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Endpoint receiving POSTed payloads.
    pub endpoint_url: String,
    /// Bearer token sent with every request, when configured.
    pub access_token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            access_token: None,
            timeout_secs: 5,
        }
    }
}

/// reqwest-backed transport posting `application/json` bodies.
pub struct HttpTransport {
    config: SenderConfig,
    client: Client,
}

impl HttpTransport {
    /// Create a new transport with its own connection pool.
    pub fn new(config: SenderConfig) -> OutboxResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OutboxError::Client(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.config.endpoint_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &[u8]) -> OutboxResult<u16> {
        let mut request = self
            .client
            .post(&self.config.endpoint_url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_vec());

        if let Some(token) = &self.config.access_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status().as_u16();

        debug!(
            url = %self.config.endpoint_url,
            bytes = payload.len(),
            status = status,
            "Payload posted"
        );

        Ok(status)
    }
}
