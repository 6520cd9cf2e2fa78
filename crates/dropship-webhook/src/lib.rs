//! Outbound webhook delivery for dropship domain events
//!
//! This crate notifies subscriber endpoints of events such as `order.created`:
//! - HMAC-SHA256 signing of every outbound body
//! - Bounded single HTTP attempts with a hard timeout
//! - Exponential backoff retries, stopping at the first success
//! - An append-only delivery log with one row per attempt
//! - Per-subscription counters and a failure-count circuit breaker
//!
//! # Example
//!
//! ```rust,ignore
//! use dropship_webhook::{
//!     DeliveryRequest, InMemoryDeliveryLog, InMemorySubscriptionStore, WebhookEngine,
//!     WebhookSubscription,
//! };
//! use dropship_core::WebhookConfig;
//! use std::sync::Arc;
//!
//! let subscriptions = Arc::new(InMemorySubscriptionStore::new());
//! subscriptions.insert(WebhookSubscription::new("wh1", "https://shop.example.com/hooks", "s3cr3t")).await?;
//!
//! let engine = WebhookEngine::from_config(
//!     &WebhookConfig::default(),
//!     subscriptions,
//!     Arc::new(InMemoryDeliveryLog::default()),
//! )?;
//!
//! let response = engine
//!     .trigger(DeliveryRequest::new("wh1", "order.created", serde_json::json!({"order_id": 123})))
//!     .await;
//! assert_eq!(response.status_code, 200);
//! ```

// Module order matters due to dependencies
pub mod events;
pub mod signature;
pub mod subscription;
pub mod delivery;
pub mod executor;
pub mod retry;
pub mod health;
pub mod engine;

pub use events::*;
pub use signature::*;
pub use subscription::*;
pub use delivery::*;
pub use executor::*;
pub use retry::*;
pub use health::*;
pub use engine::*;

use thiserror::Error;

/// Webhook errors
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Webhook not found: {0}")]
    NotFound(String),

    #[error("Webhook is inactive: {0}")]
    Inactive(String),

    #[error("Webhook delivery failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl WebhookError {
    /// HTTP-style status reported to the triggering caller
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Inactive(_) | Self::InvalidRequest(_) => 400,
            Self::ExhaustedRetries { .. }
            | Self::Configuration(_)
            | Self::Store(_)
            | Self::Http(_)
            | Self::Serialization(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, WebhookError>;
