//! Delivery invocation entry point
//!
//! Ties the health manager, retry orchestrator and logger together behind the
//! `(webhook_id, event_type, payload)` contract used by event producers.

use crate::{
    delivery::{DeliveryLogStore, DeliveryLogger},
    executor::{AttemptExecutor, ExecutorConfig, HttpDeliveryExecutor},
    health::SubscriptionHealthManager,
    retry::{DeliveryResult, RetryOrchestrator, RetryPolicy},
    subscription::SubscriptionStore,
    Result, WebhookError,
};
use dropship_core::WebhookConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Delivery trigger sent by an event producer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub webhook_id: String,
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl DeliveryRequest {
    pub fn new(
        webhook_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            webhook_id: webhook_id.into(),
            event_type: event_type.into(),
            payload,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.webhook_id.trim().is_empty() {
            return Err(WebhookError::InvalidRequest("webhook_id is required".to_string()));
        }
        if self.event_type.trim().is_empty() {
            return Err(WebhookError::InvalidRequest("event_type is required".to_string()));
        }
        Ok(())
    }
}

/// Caller-facing result of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResponse {
    pub success: bool,
    pub attempts: u32,
    pub message: String,
    pub details: Option<DeliveryResult>,
    /// 200 delivered, 404 not found, 400 inactive, 500 failed
    #[serde(skip)]
    pub status_code: u16,
}

impl DeliveryResponse {
    fn delivered(result: DeliveryResult) -> Self {
        Self {
            success: true,
            attempts: result.attempts,
            message: "Webhook delivered successfully".to_string(),
            details: Some(result),
            status_code: 200,
        }
    }

    fn exhausted(result: DeliveryResult) -> Self {
        let error = WebhookError::ExhaustedRetries {
            attempts: result.attempts,
            last_error: result.last_error(),
        };
        Self {
            success: false,
            attempts: result.attempts,
            message: error.to_string(),
            status_code: error.status_code(),
            details: Some(result),
        }
    }

    fn rejected(error: &WebhookError) -> Self {
        Self {
            success: false,
            attempts: 0,
            message: error.to_string(),
            details: None,
            status_code: error.status_code(),
        }
    }
}

/// Webhook delivery engine
pub struct WebhookEngine {
    health: SubscriptionHealthManager,
    orchestrator: RetryOrchestrator,
}

impl WebhookEngine {
    pub fn new(health: SubscriptionHealthManager, orchestrator: RetryOrchestrator) -> Self {
        Self {
            health,
            orchestrator,
        }
    }

    /// Build an engine posting over HTTP with the given stores
    pub fn from_config(
        config: &WebhookConfig,
        subscriptions: Arc<dyn SubscriptionStore>,
        delivery_log: Arc<dyn DeliveryLogStore>,
    ) -> Result<Self> {
        let executor = HttpDeliveryExecutor::new(ExecutorConfig::from(config))?;
        Ok(Self::with_executor(
            config,
            Arc::new(executor),
            subscriptions,
            delivery_log,
        ))
    }

    pub fn with_executor(
        config: &WebhookConfig,
        executor: Arc<dyn AttemptExecutor>,
        subscriptions: Arc<dyn SubscriptionStore>,
        delivery_log: Arc<dyn DeliveryLogStore>,
    ) -> Self {
        let health = SubscriptionHealthManager::new(subscriptions, config.failure_threshold);
        let orchestrator = RetryOrchestrator::new(
            executor,
            DeliveryLogger::new(delivery_log),
            RetryPolicy::from(config),
        );
        Self::new(health, orchestrator)
    }

    /// Deliver an event, returning the aggregate result.
    ///
    /// `Err` means no attempt was made. Exhausted retries are reported as
    /// `Ok` with `success == false` once the counters have been updated.
    #[instrument(skip(self, request), fields(webhook_id = %request.webhook_id, event_type = %request.event_type))]
    pub async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryResult> {
        request.validate()?;

        let subscription = self.health.load_active(&request.webhook_id).await?;
        if subscription.secret.is_empty() {
            return Err(WebhookError::Configuration(format!(
                "webhook {} has no signing secret",
                subscription.id
            )));
        }

        let result = self
            .orchestrator
            .deliver(&subscription, &request.event_type, &request.payload)
            .await;

        // The delivery already happened; a failed counter update must not hide it
        if let Err(e) = self.health.apply_outcome(&subscription, &result).await {
            error!(
                webhook_id = %subscription.id,
                error = %e,
                "Failed to update webhook counters"
            );
        }

        Ok(result)
    }

    /// Deliver an event and map the outcome to the caller-facing response
    pub async fn trigger(&self, request: DeliveryRequest) -> DeliveryResponse {
        match self.deliver(&request).await {
            Ok(result) if result.success => DeliveryResponse::delivered(result),
            Ok(result) => DeliveryResponse::exhausted(result),
            Err(e) => {
                info!(
                    webhook_id = %request.webhook_id,
                    error = %e,
                    "Webhook delivery rejected"
                );
                DeliveryResponse::rejected(&e)
            }
        }
    }
}
