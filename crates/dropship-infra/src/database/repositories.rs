use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dropship_webhook::{
    DeliveryAttempt, DeliveryLogStore, DeliveryOutcome, DeliveryStatus, SubscriptionStore,
    WebhookSubscription,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::InfraError;

const SUBSCRIPTION_COLUMNS: &str = "id, url, secret, is_active, delivery_count, success_count, \
     failure_count, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: String,
    url: String,
    secret: String,
    is_active: bool,
    delivery_count: i64,
    success_count: i64,
    failure_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for WebhookSubscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: row.id,
            url: row.url,
            secret: row.secret,
            is_active: row.is_active,
            delivery_count: row.delivery_count.max(0) as u64,
            success_count: row.success_count.max(0) as u64,
            failure_count: row.failure_count.max(0) as u64,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// PostgreSQL-backed [`SubscriptionStore`].
///
/// Counter updates run as a single `UPDATE ... RETURNING` statement so
/// concurrent deliveries to the same webhook never lose an increment.
#[derive(Clone)]
pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn get(&self, id: &str) -> dropship_webhook::Result<Option<WebhookSubscription>> {
        let query = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM webhooks WHERE id = $1");
        let row: Option<SubscriptionRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(InfraError::from)?;

        Ok(row.map(WebhookSubscription::from))
    }

    async fn insert(&self, subscription: WebhookSubscription) -> dropship_webhook::Result<()> {
        sqlx::query(
            "INSERT INTO webhooks (id, url, secret, is_active, delivery_count, success_count, \
             failure_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET url = EXCLUDED.url, secret = EXCLUDED.secret, \
             is_active = EXCLUDED.is_active, delivery_count = EXCLUDED.delivery_count, \
             success_count = EXCLUDED.success_count, failure_count = EXCLUDED.failure_count, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(&subscription.id)
        .bind(&subscription.url)
        .bind(&subscription.secret)
        .bind(subscription.is_active)
        .bind(subscription.delivery_count as i64)
        .bind(subscription.success_count as i64)
        .bind(subscription.failure_count as i64)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await
        .map_err(InfraError::from)?;

        Ok(())
    }

    async fn record_outcome(
        &self,
        id: &str,
        outcome: DeliveryOutcome,
        failure_threshold: u64,
    ) -> dropship_webhook::Result<WebhookSubscription> {
        let succeeded = outcome == DeliveryOutcome::Succeeded;

        // SET expressions see the pre-update row
        let query = format!(
            "UPDATE webhooks SET \
                delivery_count = delivery_count + 1, \
                success_count = success_count + CASE WHEN $2 THEN 1 ELSE 0 END, \
                failure_count = failure_count + CASE WHEN $2 THEN 0 ELSE 1 END, \
                is_active = CASE \
                    WHEN NOT $2 AND failure_count + 1 >= $3 THEN FALSE \
                    ELSE is_active END, \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        );

        let row: Option<SubscriptionRow> = sqlx::query_as(&query)
            .bind(id)
            .bind(succeeded)
            .bind(failure_threshold as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(InfraError::from)?;

        row.map(WebhookSubscription::from)
            .ok_or_else(|| InfraError::NotFound(id.to_string()).into())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeliveryAttemptRow {
    id: Uuid,
    webhook_id: String,
    event_type: String,
    payload: serde_json::Value,
    status: String,
    status_code: Option<i32>,
    error_message: Option<String>,
    response_time_ms: i64,
    attempt_number: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<DeliveryAttemptRow> for DeliveryAttempt {
    type Error = InfraError;

    fn try_from(row: DeliveryAttemptRow) -> Result<Self, Self::Error> {
        let status = DeliveryStatus::parse(&row.status)
            .ok_or_else(|| InfraError::InvalidRow(format!("unknown status '{}'", row.status)))?;

        Ok(Self {
            id: row.id,
            webhook_id: row.webhook_id,
            event_type: row.event_type,
            payload: row.payload,
            status,
            status_code: row.status_code.and_then(|code| u16::try_from(code).ok()),
            error_message: row.error_message,
            response_time_ms: row.response_time_ms.max(0) as u64,
            attempt_number: row.attempt_number.max(0) as u32,
            created_at: row.created_at,
        })
    }
}

/// PostgreSQL-backed [`DeliveryLogStore`], insert-only
#[derive(Clone)]
pub struct PostgresDeliveryLogStore {
    pool: PgPool,
}

impl PostgresDeliveryLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryLogStore for PostgresDeliveryLogStore {
    async fn insert(&self, attempt: &DeliveryAttempt) -> dropship_webhook::Result<()> {
        sqlx::query(
            "INSERT INTO webhook_delivery_logs (id, webhook_id, event_type, payload, status, \
             status_code, error_message, response_time_ms, attempt_number, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(attempt.id)
        .bind(&attempt.webhook_id)
        .bind(&attempt.event_type)
        .bind(&attempt.payload)
        .bind(attempt.status.as_str())
        .bind(attempt.status_code.map(i32::from))
        .bind(&attempt.error_message)
        .bind(attempt.response_time_ms as i64)
        .bind(attempt.attempt_number as i32)
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await
        .map_err(InfraError::from)?;

        Ok(())
    }

    async fn list_by_webhook(
        &self,
        webhook_id: &str,
        limit: usize,
    ) -> dropship_webhook::Result<Vec<DeliveryAttempt>> {
        let rows: Vec<DeliveryAttemptRow> = sqlx::query_as(
            "SELECT id, webhook_id, event_type, payload, status, status_code, error_message, \
             response_time_ms, attempt_number, created_at \
             FROM webhook_delivery_logs WHERE webhook_id = $1 \
             ORDER BY created_at DESC, attempt_number DESC LIMIT $2",
        )
        .bind(webhook_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(InfraError::from)?;

        rows.into_iter()
            .map(|row| DeliveryAttempt::try_from(row).map_err(Into::into))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt_row(status: &str) -> DeliveryAttemptRow {
        DeliveryAttemptRow {
            id: Uuid::new_v4(),
            webhook_id: "wh1".to_string(),
            event_type: "order.created".to_string(),
            payload: serde_json::json!({"order_id": 123}),
            status: status.to_string(),
            status_code: Some(500),
            error_message: Some("HTTP 500: boom".to_string()),
            response_time_ms: 42,
            attempt_number: 2,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_attempt_row_conversion() {
        let attempt = DeliveryAttempt::try_from(attempt_row("failed")).unwrap();

        assert_eq!(attempt.status, DeliveryStatus::Failed);
        assert_eq!(attempt.status_code, Some(500));
        assert_eq!(attempt.attempt_number, 2);
        assert_eq!(attempt.response_time_ms, 42);
    }

    #[test]
    fn test_attempt_row_unknown_status() {
        let result = DeliveryAttempt::try_from(attempt_row("pending"));
        assert!(matches!(result, Err(InfraError::InvalidRow(_))));
    }

    #[test]
    fn test_subscription_row_conversion() {
        let now = Utc::now();
        let sub = WebhookSubscription::from(SubscriptionRow {
            id: "wh1".to_string(),
            url: "https://example.com/hook".to_string(),
            secret: "s3cr3t".to_string(),
            is_active: false,
            delivery_count: 12,
            success_count: 2,
            failure_count: 10,
            created_at: now,
            updated_at: now,
        });

        assert!(!sub.is_active);
        assert_eq!(sub.failure_count, 10);
        assert_eq!(sub.delivery_count, 12);
    }

    /// Needs a reachable PostgreSQL in `DATABASE_URL`
    #[tokio::test]
    #[ignore]
    async fn test_postgres_record_outcome_trips_at_threshold() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let pool = crate::create_pool(&dropship_core::DatabaseConfig::new(url))
            .await
            .unwrap();
        crate::run_migrations(&pool).await.unwrap();
        let store = PostgresSubscriptionStore::new(pool);

        let id = format!("wh-{}", Uuid::new_v4());
        let mut sub = WebhookSubscription::new(&id, "https://example.com/hook", "s3cr3t");
        sub.failure_count = 8;
        store.insert(sub).await.unwrap();

        let updated = store.record_outcome(&id, DeliveryOutcome::Failed, 10).await.unwrap();
        assert_eq!(updated.failure_count, 9);
        assert_eq!(updated.delivery_count, 1);
        assert!(updated.is_active);

        let updated = store.record_outcome(&id, DeliveryOutcome::Failed, 10).await.unwrap();
        assert_eq!(updated.failure_count, 10);
        assert!(!updated.is_active);

        let updated = store.record_outcome(&id, DeliveryOutcome::Succeeded, 10).await.unwrap();
        assert_eq!(updated.success_count, 1);
        assert!(!updated.is_active);

        assert!(matches!(
            store.record_outcome("missing-webhook", DeliveryOutcome::Failed, 10).await,
            Err(dropship_webhook::WebhookError::NotFound(_))
        ));
    }
}
