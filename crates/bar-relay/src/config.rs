//! Relay configuration.
//!
//! One immutable value built at startup and handed to each component.

use crate::batcher::BatcherConfig;
use crate::error::{RelayError, RelayResult};
use crate::event::DEFAULT_IDENTITY_FIELD;
use crate::recorder::RecordTarget;
use relay_outbox::{DispatcherConfig, SenderConfig, DEFAULT_ENDPOINT_URL, DEFAULT_MAX_RETRY_AGE};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5005;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen address
    pub host: String,
    pub port: u16,

    /// Outbound endpoint
    pub endpoint_url: String,

    /// Bearer token for the outbound call
    pub access_token: Option<String>,

    /// Value stamped on every flushed event
    pub identity: String,
    pub identity_field: String,

    /// Recording target, if recording is enabled
    pub record: Option<RecordTarget>,

    /// Recording to replay at startup
    pub replay: Option<PathBuf>,
    pub speed: f64,

    pub soft_timeout: Duration,
    pub hard_timeout: Duration,
    pub request_timeout: Duration,
    pub sweep_interval: Duration,
    pub max_retry_age: Duration,
}

impl RelayConfig {
    /// Defaults for everything except the identity.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            access_token: None,
            identity: identity.into(),
            identity_field: DEFAULT_IDENTITY_FIELD.to_string(),
            record: None,
            replay: None,
            speed: 1.0,
            soft_timeout: Duration::from_millis(100),
            hard_timeout: Duration::from_millis(250),
            request_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(5),
            max_retry_age: DEFAULT_MAX_RETRY_AGE,
        }
    }

    /// `host:port`, bracketing IPv6 hosts.
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn validate(&self) -> RelayResult<()> {
        if self.identity.trim().is_empty() {
            return Err(RelayError::Config("identity must not be empty".into()));
        }

        let url = url::Url::parse(&self.endpoint_url)
            .map_err(|e| RelayError::Config(format!("invalid endpoint URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RelayError::Config(format!(
                "endpoint URL must be http or https, got {}",
                url.scheme()
            )));
        }

        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(RelayError::Config(format!(
                "replay speed must be a positive number, got {}",
                self.speed
            )));
        }

        if self.soft_timeout.is_zero() || self.hard_timeout.is_zero() {
            return Err(RelayError::Config("batch timeouts must be non-zero".into()));
        }

        Ok(())
    }

    pub fn batcher_config(&self) -> BatcherConfig {
        BatcherConfig {
            soft_timeout: self.soft_timeout,
            hard_timeout: self.hard_timeout,
            identity_field: self.identity_field.clone(),
            identity: self.identity.clone(),
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            sweep_interval: self.sweep_interval,
            max_retry_age: self.max_retry_age,
        }
    }

    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            endpoint_url: self.endpoint_url.clone(),
            access_token: self.access_token.clone(),
            timeout_secs: self.request_timeout.as_secs(),
        }
    }
}
