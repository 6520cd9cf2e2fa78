//! Single delivery attempts
//!
//! An executor performs exactly one signed `POST` per call. Retry policy lives
//! in [`crate::retry`].

use crate::{
    events::WebhookEnvelope,
    signature::{WebhookSigner, SIGNATURE_HEADER},
    Result, WebhookError,
};
use async_trait::async_trait;
use dropship_core::WebhookConfig;
use reqwest::{redirect, Client};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const EVENT_HEADER: &str = "X-Webhook-Event";
pub const ATTEMPT_HEADER: &str = "X-Webhook-Attempt";

/// Where and how to sign a delivery
#[derive(Debug, Clone, Copy)]
pub struct DeliveryTarget<'a> {
    pub url: &'a str,
    pub secret: &'a str,
}

/// Why a single attempt failed
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptError {
    #[error("timeout")]
    Timeout,

    #[error("{message}")]
    Transport { message: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("failed to encode payload: {message}")]
    Encode { message: String },
}

/// Result of one HTTP attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptOutcome {
    pub attempt_number: u32,
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<AttemptError>,
    pub response_time_ms: u64,
}

impl AttemptOutcome {
    pub fn delivered(attempt_number: u32, status_code: u16, response_time_ms: u64) -> Self {
        Self {
            attempt_number,
            success: true,
            status_code: Some(status_code),
            error: None,
            response_time_ms,
        }
    }

    pub fn failed(attempt_number: u32, error: AttemptError, response_time_ms: u64) -> Self {
        let status_code = match &error {
            AttemptError::Http { status, .. } => Some(*status),
            _ => None,
        };
        Self {
            attempt_number,
            success: false,
            status_code,
            error: Some(error),
            response_time_ms,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

/// Performs one delivery attempt
#[async_trait]
pub trait AttemptExecutor: Send + Sync {
    async fn attempt(
        &self,
        target: DeliveryTarget<'_>,
        event_type: &str,
        payload: &serde_json::Value,
        attempt_number: u32,
    ) -> AttemptOutcome;
}

/// HTTP executor settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Hard limit for the whole request
    pub timeout: Duration,
    pub user_agent: String,
    /// Maximum characters of response body kept in an error
    pub error_body_limit: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from(&WebhookConfig::default())
    }
}

impl From<&WebhookConfig> for ExecutorConfig {
    fn from(config: &WebhookConfig) -> Self {
        Self {
            timeout: config.request_timeout(),
            user_agent: config.user_agent.clone(),
            error_body_limit: config.error_body_limit,
        }
    }
}

/// Executor posting signed envelopes with `reqwest`
pub struct HttpDeliveryExecutor {
    client: Client,
    config: ExecutorConfig,
}

impl HttpDeliveryExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        if config.timeout.is_zero() {
            return Err(WebhookError::Configuration(
                "request timeout must be greater than zero".to_string(),
            ));
        }

        // 3xx must surface as a failure, so redirects are not followed
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn send(
        &self,
        target: DeliveryTarget<'_>,
        event_type: &str,
        payload: &serde_json::Value,
        attempt_number: u32,
    ) -> std::result::Result<u16, AttemptError> {
        let body = WebhookEnvelope::new(event_type, payload.clone())
            .to_bytes()
            .map_err(|e| AttemptError::Encode {
                message: e.to_string(),
            })?;
        let signature = WebhookSigner::new(target.secret).sign(&body);

        let response = self
            .client
            .post(target.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", self.config.user_agent.as_str())
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, event_type)
            .header(ATTEMPT_HEADER, attempt_number.to_string())
            .body(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(status.as_u16());
        }

        let body = match read_error_body(response, self.config.error_body_limit).await {
            Ok(text) => text,
            Err(e) if e.is_timeout() => return Err(AttemptError::Timeout),
            Err(_) => String::new(),
        };

        Err(AttemptError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl AttemptExecutor for HttpDeliveryExecutor {
    async fn attempt(
        &self,
        target: DeliveryTarget<'_>,
        event_type: &str,
        payload: &serde_json::Value,
        attempt_number: u32,
    ) -> AttemptOutcome {
        let started = Instant::now();
        let result = self.send(target, event_type, payload, attempt_number).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(status) => {
                debug!(
                    url = %target.url,
                    status = status,
                    attempt = attempt_number,
                    elapsed_ms = elapsed_ms,
                    "Webhook attempt delivered"
                );
                AttemptOutcome::delivered(attempt_number, status, elapsed_ms)
            }
            Err(error) => {
                warn!(
                    url = %target.url,
                    error = %error,
                    attempt = attempt_number,
                    elapsed_ms = elapsed_ms,
                    "Webhook attempt failed"
                );
                AttemptOutcome::failed(attempt_number, error, elapsed_ms)
            }
        }
    }
}

fn classify_transport_error(error: reqwest::Error) -> AttemptError {
    if error.is_timeout() {
        AttemptError::Timeout
    } else {
        AttemptError::Transport {
            message: error.to_string(),
        }
    }
}

/// Read at most `limit` characters of a response body.
///
/// Stops after `limit * 4` bytes, enough for `limit` UTF-8 characters.
async fn read_error_body(
    mut response: reqwest::Response,
    limit: usize,
) -> std::result::Result<String, reqwest::Error> {
    let max_bytes = limit.saturating_mul(4);
    let mut buf: Vec<u8> = Vec::new();

    while buf.len() < max_bytes {
        match response.chunk().await? {
            Some(chunk) => buf.extend_from_slice(&chunk),
            None => break,
        }
    }
    buf.truncate(max_bytes);

    Ok(truncate(&String::from_utf8_lossy(&buf), limit))
}

/// Truncate to at most `limit` characters on a char boundary
fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("", 3), "");
    }

    #[test]
    fn test_attempt_error_messages() {
        assert_eq!(AttemptError::Timeout.to_string(), "timeout");
        assert_eq!(
            AttemptError::Http {
                status: 503,
                body: "Service Unavailable".to_string()
            }
            .to_string(),
            "HTTP 503: Service Unavailable"
        );
    }

    #[test]
    fn test_failed_outcome_carries_status() {
        let outcome = AttemptOutcome::failed(
            2,
            AttemptError::Http {
                status: 404,
                body: "not found".to_string(),
            },
            15,
        );
        assert!(!outcome.success);
        assert_eq!(outcome.status_code, Some(404));
        assert_eq!(outcome.error_message().as_deref(), Some("HTTP 404: not found"));

        let timeout = AttemptOutcome::failed(1, AttemptError::Timeout, 30_000);
        assert_eq!(timeout.status_code, None);
        assert_eq!(timeout.error_message().as_deref(), Some("timeout"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ExecutorConfig {
            timeout: Duration::ZERO,
            ..ExecutorConfig::default()
        };
        assert!(matches!(
            HttpDeliveryExecutor::new(config),
            Err(WebhookError::Configuration(_))
        ));

        let config = ExecutorConfig::from(
            &WebhookConfig::new().with_request_timeout(Duration::from_millis(500)),
        );
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert!(HttpDeliveryExecutor::new(config).is_ok());
    }

    #[test]
    fn test_executor_config_from_webhook_config() {
        let config = ExecutorConfig::from(&WebhookConfig::default());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.user_agent, "Dropship-Webhooks/1.0");
        assert_eq!(config.error_body_limit, 500);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = AttemptOutcome::failed(1, AttemptError::Timeout, 10);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["error"]["kind"], "timeout");
        assert_eq!(json["status_code"], serde_json::Value::Null);
    }
}
