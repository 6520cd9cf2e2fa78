//! Webhook subscriptions and their store
//!
//! Subscriptions are created by the back office; the delivery engine only
//! reads them and bumps their counters.

use crate::{Result, WebhookError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// A subscriber endpoint registered for event notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSubscription {
    /// Subscription ID
    pub id: String,
    /// Target URL
    pub url: String,
    /// Shared signing secret, never transmitted
    pub secret: String,
    /// Cleared once the circuit breaker trips; never set again by the engine
    pub is_active: bool,
    /// Delivery invocations, one per event regardless of attempts
    pub delivery_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookSubscription {
    /// Create a new active subscription with zeroed counters
    pub fn new(id: &str, url: &str, secret: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            url: url.to_string(),
            secret: secret.to_string(),
            is_active: true,
            delivery_count: 0,
            success_count: 0,
            failure_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the outcome of one delivery invocation.
    ///
    /// Returns `true` if this call disabled the subscription.
    pub fn record_outcome(&mut self, outcome: DeliveryOutcome, failure_threshold: u64) -> bool {
        self.delivery_count += 1;
        match outcome {
            DeliveryOutcome::Succeeded => self.success_count += 1,
            DeliveryOutcome::Failed => self.failure_count += 1,
        }
        self.updated_at = Utc::now();

        if self.is_active && self.failure_count >= failure_threshold {
            self.is_active = false;
            return true;
        }
        false
    }
}

/// Aggregate result of one delivery invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Succeeded,
    Failed,
}

impl DeliveryOutcome {
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Succeeded
        } else {
            Self::Failed
        }
    }
}

/// Subscription persistence boundary
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Get subscription by ID
    async fn get(&self, id: &str) -> Result<Option<WebhookSubscription>>;

    /// Store a subscription, replacing any with the same ID
    async fn insert(&self, subscription: WebhookSubscription) -> Result<()>;

    /// Atomically bump the counters for one invocation and disable the
    /// subscription once `failure_count` reaches `failure_threshold`.
    ///
    /// Returns the updated record.
    async fn record_outcome(
        &self,
        id: &str,
        outcome: DeliveryOutcome,
        failure_threshold: u64,
    ) -> Result<WebhookSubscription>;
}

/// In-memory subscription store
pub struct InMemorySubscriptionStore {
    subscriptions: DashMap<String, WebhookSubscription>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
        }
    }
}

impl Default for InMemorySubscriptionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn get(&self, id: &str) -> Result<Option<WebhookSubscription>> {
        Ok(self.subscriptions.get(id).map(|s| s.clone()))
    }

    async fn insert(&self, subscription: WebhookSubscription) -> Result<()> {
        self.subscriptions
            .insert(subscription.id.clone(), subscription);
        Ok(())
    }

    async fn record_outcome(
        &self,
        id: &str,
        outcome: DeliveryOutcome,
        failure_threshold: u64,
    ) -> Result<WebhookSubscription> {
        // The entry guard holds the shard lock for the whole update
        let mut entry = self
            .subscriptions
            .get_mut(id)
            .ok_or_else(|| WebhookError::NotFound(id.to_string()))?;
        entry.record_outcome(outcome, failure_threshold);
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_subscription_creation() {
        let sub = WebhookSubscription::new("wh1", "https://example.com/hook", "s3cr3t");

        assert!(sub.is_active);
        assert_eq!(sub.delivery_count, 0);
        assert_eq!(sub.success_count, 0);
        assert_eq!(sub.failure_count, 0);
    }

    #[test]
    fn test_record_success() {
        let mut sub = WebhookSubscription::new("wh1", "https://example.com/hook", "s3cr3t");

        let tripped = sub.record_outcome(DeliveryOutcome::Succeeded, 10);

        assert!(!tripped);
        assert_eq!(sub.delivery_count, 1);
        assert_eq!(sub.success_count, 1);
        assert_eq!(sub.failure_count, 0);
        assert!(sub.is_active);
    }

    #[test]
    fn test_threshold_counts_lifetime_failures() {
        let mut sub = WebhookSubscription::new("wh1", "https://example.com/hook", "s3cr3t");

        // Successes in between do not reset the failure count
        for _ in 0..9 {
            assert!(!sub.record_outcome(DeliveryOutcome::Failed, 10));
            sub.record_outcome(DeliveryOutcome::Succeeded, 10);
        }
        assert!(sub.is_active);
        assert_eq!(sub.failure_count, 9);

        assert!(sub.record_outcome(DeliveryOutcome::Failed, 10));
        assert!(!sub.is_active);
        assert_eq!(sub.failure_count, 10);
        assert_eq!(sub.delivery_count, 19);
    }

    #[test]
    fn test_disabled_stays_disabled() {
        let mut sub = WebhookSubscription::new("wh1", "https://example.com/hook", "s3cr3t");
        sub.failure_count = 10;
        sub.is_active = false;

        assert!(!sub.record_outcome(DeliveryOutcome::Succeeded, 10));
        assert!(!sub.is_active);
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemorySubscriptionStore::new();
        store
            .insert(WebhookSubscription::new("wh1", "https://example.com", "secret"))
            .await
            .unwrap();

        assert!(store.get("wh1").await.unwrap().is_some());
        assert!(store.get("missing").await.unwrap().is_none());

        let updated = store
            .record_outcome("wh1", DeliveryOutcome::Failed, 10)
            .await
            .unwrap();
        assert_eq!(updated.failure_count, 1);
        assert_eq!(store.get("wh1").await.unwrap().unwrap().failure_count, 1);

        let missing = store
            .record_outcome("missing", DeliveryOutcome::Failed, 10)
            .await;
        assert!(matches!(missing, Err(WebhookError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store
            .insert(WebhookSubscription::new("wh1", "https://example.com", "secret"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .record_outcome("wh1", DeliveryOutcome::Failed, 1000)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let sub = store.get("wh1").await.unwrap().unwrap();
        assert_eq!(sub.failure_count, 50);
        assert_eq!(sub.delivery_count, 50);
    }
}
