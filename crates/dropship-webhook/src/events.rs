//! Webhook event types and the outbound envelope
//!
//! Subscribers receive `{"event": ..., "timestamp": ..., "data": ...}`.

use crate::{Result, WebhookError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known event types emitted by the back office.
///
/// Event types travel as plain strings, so producers may also send names not
/// listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEventType {
    // Order events
    OrderCreated,
    OrderUpdated,
    OrderShipped,
    OrderCancelled,

    // Catalog events
    ProductCreated,
    ProductUpdated,
    InventoryLow,

    // Customer events
    CustomerCreated,

    // Sync events
    SyncCompleted,
    SyncFailed,
}

impl WebhookEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "order.created",
            Self::OrderUpdated => "order.updated",
            Self::OrderShipped => "order.shipped",
            Self::OrderCancelled => "order.cancelled",
            Self::ProductCreated => "product.created",
            Self::ProductUpdated => "product.updated",
            Self::InventoryLow => "inventory.low",
            Self::CustomerCreated => "customer.created",
            Self::SyncCompleted => "sync.completed",
            Self::SyncFailed => "sync.failed",
        }
    }
}

impl From<WebhookEventType> for String {
    fn from(event_type: WebhookEventType) -> Self {
        event_type.as_str().to_string()
    }
}

/// Body posted to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// Event type, e.g. `order.created`
    pub event: String,
    /// Time the envelope was built
    pub timestamp: DateTime<Utc>,
    /// Producer payload, passed through untouched
    pub data: serde_json::Value,
}

impl WebhookEnvelope {
    pub fn new(event_type: &str, data: serde_json::Value) -> Self {
        Self {
            event: event_type.to_string(),
            timestamp: Utc::now(),
            data,
        }
    }

    /// Serialize to the exact bytes that are signed and sent
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| WebhookError::Serialization(e.to_string()))
    }
}
