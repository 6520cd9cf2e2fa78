use sqlx::PgPool;

use crate::{InfraError, Result};

/// Create the webhook tables if they do not exist.
///
/// `webhooks` is normally owned by the back office; it is created here so a
/// fresh database can run the delivery engine on its own.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS webhooks (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            secret TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            delivery_count BIGINT NOT NULL DEFAULT 0,
            success_count BIGINT NOT NULL DEFAULT 0,
            failure_count BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        "CREATE TABLE IF NOT EXISTS webhook_delivery_logs (
            id UUID PRIMARY KEY,
            webhook_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            payload JSONB NOT NULL,
            status TEXT NOT NULL,
            status_code INTEGER,
            error_message TEXT,
            response_time_ms BIGINT NOT NULL,
            attempt_number INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        "CREATE INDEX IF NOT EXISTS webhook_delivery_logs_webhook_idx
            ON webhook_delivery_logs (webhook_id, created_at DESC)",
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| InfraError::Migration(e.to_string()))?;
    }

    Ok(())
}
