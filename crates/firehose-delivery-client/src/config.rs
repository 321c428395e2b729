//! Delivery client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, DeliveryResult};

/// Hard per-request record limit of the ingestion API.
pub const MAX_BATCH_SIZE: usize = 25;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:4573";
pub const DEFAULT_STREAM_NAME: &str = "company-research-run-metadata";

/// Longest delivery stream name the ingestion API accepts.
pub const MAX_STREAM_NAME_LEN: usize = 64;

/// Stream names travel as a URL path segment: `[A-Za-z0-9_.-]{1,64}`.
fn is_valid_stream_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_STREAM_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

/// Configuration for the delivery client.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Base URL of the ingestion API.
    pub endpoint: String,
    /// Destination delivery stream.
    pub stream_name: String,
    /// Bearer token sent with every request.
    pub auth_token: String,
    /// Attempts per chunk, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Upper bound on any single retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Records per request, at most [`MAX_BATCH_SIZE`].
    pub batch_size: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            auth_token: String::new(),
            max_attempts: 3,
            initial_retry_delay_ms: 1000,
            max_retry_delay_ms: 8000,
            request_timeout_secs: 30,
            batch_size: MAX_BATCH_SIZE,
        }
    }
}

impl std::fmt::Debug for DeliveryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryConfig")
            .field("endpoint", &self.endpoint)
            .field("stream_name", &self.stream_name)
            .field(
                "auth_token",
                &if self.auth_token.is_empty() {
                    "<unset>"
                } else {
                    "<redacted>"
                },
            )
            .field("max_attempts", &self.max_attempts)
            .field("initial_retry_delay_ms", &self.initial_retry_delay_ms)
            .field("max_retry_delay_ms", &self.max_retry_delay_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl DeliveryConfig {
    /// Check the configuration before any network traffic.
    pub fn validate(&self) -> DeliveryResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(DeliveryError::Config("endpoint is empty".to_string()));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(DeliveryError::Config(format!(
                "endpoint must be an http(s) URL: {}",
                self.endpoint
            )));
        }
        if self.stream_name.trim().is_empty() {
            return Err(DeliveryError::Config("stream name is empty".to_string()));
        }
        if !is_valid_stream_name(&self.stream_name) {
            return Err(DeliveryError::Config(format!(
                "stream name {:?} must be 1-{MAX_STREAM_NAME_LEN} characters of A-Z, a-z, 0-9, '_', '.' or '-'",
                self.stream_name
            )));
        }
        if self.auth_token.trim().is_empty() {
            return Err(DeliveryError::Config("auth token is empty".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(DeliveryError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(DeliveryError::Config(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if self.max_retry_delay_ms < self.initial_retry_delay_ms {
            return Err(DeliveryError::Config(
                "max_retry_delay_ms is lower than initial_retry_delay_ms".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(DeliveryError::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Delay before retry number `retry` (1-based): doubles each time, capped.
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let multiplier = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let delay_ms = self
            .initial_retry_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_retry_delay_ms);
        Duration::from_millis(delay_ms)
    }
}
