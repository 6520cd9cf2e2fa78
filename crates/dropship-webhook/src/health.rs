//! Subscription health
//!
//! Gatekeeps deliveries to active subscriptions and applies the outcome of
//! each invocation to the subscription counters. A subscription whose
//! lifetime `failure_count` reaches the threshold is disabled for good.

use crate::{
    retry::DeliveryResult,
    subscription::{DeliveryOutcome, SubscriptionStore, WebhookSubscription},
    Result, WebhookError,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_FAILURE_THRESHOLD: u64 = 10;

/// The only component allowed to mutate subscriptions
pub struct SubscriptionHealthManager {
    store: Arc<dyn SubscriptionStore>,
    failure_threshold: u64,
}

impl SubscriptionHealthManager {
    pub fn new(store: Arc<dyn SubscriptionStore>, failure_threshold: u64) -> Self {
        Self {
            store,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Load a subscription that may receive deliveries
    pub async fn load_active(&self, webhook_id: &str) -> Result<WebhookSubscription> {
        let subscription = self
            .store
            .get(webhook_id)
            .await?
            .ok_or_else(|| WebhookError::NotFound(webhook_id.to_string()))?;

        if !subscription.is_active {
            debug!(webhook_id = %webhook_id, "Skipping delivery to inactive webhook");
            return Err(WebhookError::Inactive(webhook_id.to_string()));
        }

        Ok(subscription)
    }

    /// Apply one invocation's outcome. Call exactly once per invocation.
    pub async fn apply_outcome(
        &self,
        subscription: &WebhookSubscription,
        result: &DeliveryResult,
    ) -> Result<WebhookSubscription> {
        let updated = self
            .store
            .record_outcome(
                &subscription.id,
                DeliveryOutcome::from_success(result.success),
                self.failure_threshold,
            )
            .await?;

        if subscription.is_active && !updated.is_active {
            warn!(
                webhook_id = %updated.id,
                url = %updated.url,
                failure_count = updated.failure_count,
                threshold = self.failure_threshold,
                "Webhook disabled after reaching failure threshold"
            );
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{AttemptError, AttemptOutcome};
    use crate::subscription::InMemorySubscriptionStore;

    fn result(success: bool) -> DeliveryResult {
        let last_result = if success {
            AttemptOutcome::delivered(1, 200, 5)
        } else {
            AttemptOutcome::failed(3, AttemptError::Timeout, 5)
        };
        DeliveryResult {
            success,
            attempts: last_result.attempt_number,
            last_result,
        }
    }

    async fn manager_with(sub: WebhookSubscription) -> (SubscriptionHealthManager, Arc<InMemorySubscriptionStore>) {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store.insert(sub).await.unwrap();
        (
            SubscriptionHealthManager::new(store.clone(), DEFAULT_FAILURE_THRESHOLD),
            store,
        )
    }

    #[tokio::test]
    async fn test_load_active() {
        let (manager, _) =
            manager_with(WebhookSubscription::new("wh1", "https://example.com", "secret")).await;

        assert!(manager.load_active("wh1").await.is_ok());
        assert!(matches!(
            manager.load_active("missing").await,
            Err(WebhookError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_inactive_rejected() {
        let mut sub = WebhookSubscription::new("wh1", "https://example.com", "secret");
        sub.is_active = false;
        let (manager, _) = manager_with(sub).await;

        assert!(matches!(
            manager.load_active("wh1").await,
            Err(WebhookError::Inactive(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_success() {
        let (manager, _) =
            manager_with(WebhookSubscription::new("wh1", "https://example.com", "secret")).await;
        let sub = manager.load_active("wh1").await.unwrap();

        let updated = manager.apply_outcome(&sub, &result(true)).await.unwrap();

        assert_eq!(updated.delivery_count, 1);
        assert_eq!(updated.success_count, 1);
        assert_eq!(updated.failure_count, 0);
        assert!(updated.is_active);
    }

    #[tokio::test]
    async fn test_trips_at_threshold() {
        let mut sub = WebhookSubscription::new("wh1", "https://example.com", "secret");
        sub.failure_count = 8;
        let (manager, store) = manager_with(sub).await;

        let sub = manager.load_active("wh1").await.unwrap();
        let updated = manager.apply_outcome(&sub, &result(false)).await.unwrap();
        assert_eq!(updated.failure_count, 9);
        assert!(updated.is_active);

        let updated = manager.apply_outcome(&updated, &result(false)).await.unwrap();
        assert_eq!(updated.failure_count, 10);
        assert!(!updated.is_active);

        assert!(!store.get("wh1").await.unwrap().unwrap().is_active);
        assert!(matches!(
            manager.load_active("wh1").await,
            Err(WebhookError::Inactive(_))
        ));
    }
}
