//! Retry orchestration
//!
//! Drives sequential attempts against one subscription, logging each one and
//! backing off exponentially between failures.

use crate::{
    delivery::{DeliveryAttempt, DeliveryLogger, DeliveryStatus},
    executor::{AttemptExecutor, AttemptOutcome, DeliveryTarget},
    subscription::WebhookSubscription,
};
use chrono::Utc;
use dropship_core::WebhookConfig;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Retry policy for one delivery invocation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// The wait after failed attempt `k` is `backoff_base * 2^k`
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl From<&WebhookConfig> for RetryPolicy {
    fn from(config: &WebhookConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Delay after failed attempt `attempt` (1-based), or `None` if it was the last
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        Some(self.backoff_base.saturating_mul(factor))
    }
}

/// Aggregate result of a delivery invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryResult {
    pub success: bool,
    /// Attempts actually executed
    pub attempts: u32,
    /// Detail of the most recent attempt
    pub last_result: AttemptOutcome,
}

impl DeliveryResult {
    pub fn last_error(&self) -> String {
        self.last_result
            .error_message()
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Drives up to `max_attempts` attempts, stopping at the first success
pub struct RetryOrchestrator {
    executor: Arc<dyn AttemptExecutor>,
    logger: DeliveryLogger,
    policy: RetryPolicy,
}

impl RetryOrchestrator {
    pub fn new(executor: Arc<dyn AttemptExecutor>, logger: DeliveryLogger, policy: RetryPolicy) -> Self {
        Self {
            executor,
            logger,
            policy,
        }
    }

    pub async fn deliver(
        &self,
        subscription: &WebhookSubscription,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> DeliveryResult {
        let target = DeliveryTarget {
            url: &subscription.url,
            secret: &subscription.secret,
        };
        let mut attempt_number = 1;

        loop {
            let outcome = self
                .executor
                .attempt(target, event_type, payload, attempt_number)
                .await;

            self.logger
                .record(&attempt_record(subscription, event_type, payload, &outcome))
                .await;

            if outcome.success {
                info!(
                    webhook_id = %subscription.id,
                    event_type = %event_type,
                    attempts = attempt_number,
                    "Webhook delivered successfully"
                );
                return DeliveryResult {
                    success: true,
                    attempts: attempt_number,
                    last_result: outcome,
                };
            }

            match self.policy.delay_after(attempt_number) {
                Some(delay) => {
                    debug!(
                        webhook_id = %subscription.id,
                        attempt = attempt_number,
                        delay_ms = delay.as_millis() as u64,
                        "Waiting before retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt_number += 1;
                }
                None => {
                    warn!(
                        webhook_id = %subscription.id,
                        event_type = %event_type,
                        attempts = attempt_number,
                        error = outcome.error_message().as_deref().unwrap_or(""),
                        "Webhook delivery failed after all retries"
                    );
                    return DeliveryResult {
                        success: false,
                        attempts: attempt_number,
                        last_result: outcome,
                    };
                }
            }
        }
    }
}

fn attempt_record(
    subscription: &WebhookSubscription,
    event_type: &str,
    payload: &serde_json::Value,
    outcome: &AttemptOutcome,
) -> DeliveryAttempt {
    DeliveryAttempt {
        id: Uuid::new_v4(),
        webhook_id: subscription.id.clone(),
        event_type: event_type.to_string(),
        payload: payload.clone(),
        status: if outcome.success {
            DeliveryStatus::Delivered
        } else {
            DeliveryStatus::Failed
        },
        status_code: outcome.status_code,
        error_message: outcome.error_message(),
        response_time_ms: outcome.response_time_ms,
        attempt_number: outcome.attempt_number,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryLogStore, InMemoryDeliveryLog};
    use crate::executor::AttemptError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::time::Instant;

    /// Replays scripted status codes and records attempt timing
    struct ScriptedExecutor {
        statuses: Vec<u16>,
        calls: Mutex<Vec<(u32, Instant, Instant)>>,
        attempt_duration: Duration,
    }

    impl ScriptedExecutor {
        fn new(statuses: Vec<u16>) -> Self {
            Self {
                statuses,
                calls: Mutex::new(Vec::new()),
                attempt_duration: Duration::from_millis(100),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl AttemptExecutor for ScriptedExecutor {
        async fn attempt(
            &self,
            _target: DeliveryTarget<'_>,
            _event_type: &str,
            _payload: &serde_json::Value,
            attempt_number: u32,
        ) -> AttemptOutcome {
            let started = Instant::now();
            tokio::time::sleep(self.attempt_duration).await;
            self.calls.lock().push((attempt_number, started, Instant::now()));

            let index = (attempt_number as usize - 1).min(self.statuses.len() - 1);
            let status = self.statuses[index];
            if (200..300).contains(&status) {
                AttemptOutcome::delivered(attempt_number, status, 100)
            } else {
                AttemptOutcome::failed(
                    attempt_number,
                    AttemptError::Http {
                        status,
                        body: "error".to_string(),
                    },
                    100,
                )
            }
        }
    }

    fn orchestrator(
        executor: Arc<ScriptedExecutor>,
        log: Arc<InMemoryDeliveryLog>,
        policy: RetryPolicy,
    ) -> RetryOrchestrator {
        RetryOrchestrator::new(executor, DeliveryLogger::new(log), policy)
    }

    fn subscription() -> WebhookSubscription {
        WebhookSubscription::new("wh1", "https://example.com/hook", "s3cr3t")
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_after(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_secs(4)));
        assert_eq!(policy.delay_after(3), None);
        assert_eq!(policy.delay_after(0), None);
    }

    #[test]
    fn test_policy_from_config() {
        let config = WebhookConfig::new()
            .with_max_attempts(0)
            .with_backoff_base(Duration::from_millis(10));
        let policy = RetryPolicy::from(&config);

        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay_after(1), None);
        assert_eq!(RetryPolicy::new(4, Duration::from_millis(10)).delay_after(3), Some(Duration::from_millis(80)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_try_success() {
        let executor = Arc::new(ScriptedExecutor::new(vec![200]));
        let log = Arc::new(InMemoryDeliveryLog::default());
        let orchestrator = orchestrator(executor.clone(), log.clone(), RetryPolicy::default());

        let result = orchestrator
            .deliver(&subscription(), "order.created", &json!({"order_id": 123}))
            .await;

        assert!(result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(executor.call_count(), 1);
        assert_eq!(log.list_by_webhook("wh1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_third_attempt() {
        let executor = Arc::new(ScriptedExecutor::new(vec![500, 500, 200]));
        let log = Arc::new(InMemoryDeliveryLog::default());
        let orchestrator = orchestrator(executor.clone(), log.clone(), RetryPolicy::default());

        let result = orchestrator
            .deliver(&subscription(), "order.created", &json!({"order_id": 123}))
            .await;

        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.last_result.status_code, Some(200));

        let mut rows = log.list_by_webhook("wh1", 10).await.unwrap();
        rows.reverse();
        let statuses: Vec<_> = rows.iter().map(|r| (r.attempt_number, r.status)).collect();
        assert_eq!(
            statuses,
            vec![
                (1, DeliveryStatus::Failed),
                (2, DeliveryStatus::Failed),
                (3, DeliveryStatus::Delivered),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_stops_at_max_attempts() {
        let executor = Arc::new(ScriptedExecutor::new(vec![500]));
        let log = Arc::new(InMemoryDeliveryLog::default());
        let orchestrator = orchestrator(executor.clone(), log.clone(), RetryPolicy::default());

        let started = Instant::now();
        let result = orchestrator
            .deliver(&subscription(), "order.created", &json!({}))
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.last_error(), "HTTP 500: error");
        assert_eq!(executor.call_count(), 3);
        assert_eq!(log.len(), 3);

        // 3 attempts of 100ms, 2s + 4s of backoff, nothing after the last attempt
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(6300), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(8000), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_lower_bounds() {
        let executor = Arc::new(ScriptedExecutor::new(vec![500, 500, 500]));
        let log = Arc::new(InMemoryDeliveryLog::default());
        let orchestrator = orchestrator(executor.clone(), log, RetryPolicy::default());

        orchestrator
            .deliver(&subscription(), "order.created", &json!({}))
            .await;

        let calls = executor.calls.lock().clone();
        assert_eq!(calls.len(), 3);

        let gap_1_2 = calls[1].1 - calls[0].2;
        let gap_2_3 = calls[2].1 - calls[1].2;
        assert!(gap_1_2 >= Duration::from_secs(2), "gap was {:?}", gap_1_2);
        assert!(gap_2_3 >= Duration::from_secs(4), "gap was {:?}", gap_2_3);
    }
}
