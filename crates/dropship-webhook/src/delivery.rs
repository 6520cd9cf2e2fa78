//! Delivery attempt log
//!
//! Every physical HTTP attempt is recorded as an immutable row. Writing the
//! log is best effort: a failed write is reported and otherwise ignored.

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Attempt status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Endpoint answered with a 2xx status
    Delivered,
    /// Any other status, a timeout or a transport error
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Single delivery attempt log row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub webhook_id: String,
    pub event_type: String,
    /// Snapshot of the producer payload
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    /// HTTP status code (if a response was received)
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub response_time_ms: u64,
    /// 1-based, restarts for every invocation
    pub attempt_number: u32,
    pub created_at: DateTime<Utc>,
}

/// Delivery log persistence boundary
#[async_trait]
pub trait DeliveryLogStore: Send + Sync {
    /// Append an attempt row
    async fn insert(&self, attempt: &DeliveryAttempt) -> Result<()>;

    /// List the most recent attempts for a webhook, newest first
    async fn list_by_webhook(&self, webhook_id: &str, limit: usize) -> Result<Vec<DeliveryAttempt>>;
}

/// In-memory delivery log with a per-webhook size limit
pub struct InMemoryDeliveryLog {
    by_webhook: DashMap<String, VecDeque<DeliveryAttempt>>,
    max_per_webhook: usize,
    total_count: RwLock<usize>,
}

impl InMemoryDeliveryLog {
    pub fn new(max_per_webhook: usize) -> Self {
        Self {
            by_webhook: DashMap::new(),
            max_per_webhook,
            total_count: RwLock::new(0),
        }
    }

    /// Number of rows currently held
    pub fn len(&self) -> usize {
        *self.total_count.read()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryDeliveryLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl DeliveryLogStore for InMemoryDeliveryLog {
    async fn insert(&self, attempt: &DeliveryAttempt) -> Result<()> {
        let mut rows = self
            .by_webhook
            .entry(attempt.webhook_id.clone())
            .or_insert_with(VecDeque::new);
        rows.push_back(attempt.clone());

        let mut count = self.total_count.write();
        *count += 1;
        while rows.len() > self.max_per_webhook {
            rows.pop_front();
            *count = count.saturating_sub(1);
        }

        Ok(())
    }

    async fn list_by_webhook(&self, webhook_id: &str, limit: usize) -> Result<Vec<DeliveryAttempt>> {
        Ok(self
            .by_webhook
            .get(webhook_id)
            .map(|rows| rows.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Best-effort writer for attempt rows
#[derive(Clone)]
pub struct DeliveryLogger {
    store: Arc<dyn DeliveryLogStore>,
}

impl DeliveryLogger {
    pub fn new(store: Arc<dyn DeliveryLogStore>) -> Self {
        Self { store }
    }

    /// Record an attempt. Store failures are logged and swallowed.
    pub async fn record(&self, attempt: &DeliveryAttempt) {
        match self.store.insert(attempt).await {
            Ok(()) => debug!(
                webhook_id = %attempt.webhook_id,
                attempt = attempt.attempt_number,
                status = attempt.status.as_str(),
                "Recorded delivery attempt"
            ),
            Err(e) => warn!(
                webhook_id = %attempt.webhook_id,
                attempt = attempt.attempt_number,
                error = %e,
                "Failed to record delivery attempt"
            ),
        }
    }
}
