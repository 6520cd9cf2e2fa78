//! Application state and initialization

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use dropship_core::{AppConfig, SubscriptionConfig};
use dropship_infra::{create_pool, run_migrations, PostgresDeliveryLogStore, PostgresSubscriptionStore};
use dropship_webhook::{
    DeliveryLogStore, InMemoryDeliveryLog, InMemorySubscriptionStore, SubscriptionStore,
    WebhookEngine, WebhookSubscription,
};

use crate::cli::Args;
use crate::server::Server;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WebhookEngine>,
    pub delivery_log: Arc<dyn DeliveryLogStore>,
}

impl AppState {
    pub fn new(engine: Arc<WebhookEngine>, delivery_log: Arc<dyn DeliveryLogStore>) -> Self {
        Self {
            engine,
            delivery_log,
        }
    }

    /// Wire the engine to PostgreSQL when configured, otherwise to memory
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let subscriptions: Arc<dyn SubscriptionStore>;
        let delivery_log: Arc<dyn DeliveryLogStore>;

        if config.database.url.is_some() {
            let pool = create_pool(&config.database)
                .await
                .context("Failed to connect to database")?;
            run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            info!("Using PostgreSQL stores");

            subscriptions = Arc::new(PostgresSubscriptionStore::new(pool.clone()));
            delivery_log = Arc::new(PostgresDeliveryLogStore::new(pool));
        } else {
            warn!("database.url not set, using in-memory stores");

            subscriptions = Arc::new(InMemorySubscriptionStore::new());
            delivery_log = Arc::new(InMemoryDeliveryLog::default());

            if config.webhook.subscriptions.is_empty() {
                warn!("No webhook.subscriptions configured, every delivery will return 404");
            }
        }

        seed_subscriptions(subscriptions.as_ref(), &config.webhook.subscriptions)
            .await
            .context("Failed to seed subscriptions")?;

        let engine = WebhookEngine::from_config(&config.webhook, subscriptions, delivery_log.clone())
            .context("Failed to build webhook engine")?;

        Ok(Self::new(Arc::new(engine), delivery_log))
    }
}

/// Register configured subscriptions whose id is not stored yet.
///
/// Existing records keep their counters and active flag.
async fn seed_subscriptions(
    store: &dyn SubscriptionStore,
    seeds: &[SubscriptionConfig],
) -> dropship_webhook::Result<usize> {
    let mut added = 0;
    for seed in seeds {
        if store.get(&seed.id).await?.is_some() {
            continue;
        }
        store
            .insert(WebhookSubscription::new(&seed.id, &seed.url, &seed.secret))
            .await?;
        added += 1;
    }

    if added > 0 {
        info!(count = added, "Registered configured webhook subscriptions");
    }
    Ok(added)
}

/// Main application
pub struct App {
    config: AppConfig,
    state: AppState,
}

impl App {
    /// Build the application with all dependencies
    pub async fn build(args: Args) -> Result<Self> {
        let config_path = args.config.to_string_lossy().to_string();
        let mut config = AppConfig::load_from_file(&config_path)
            .with_context(|| format!("Failed to load configuration from {}", config_path))?;

        if let Some(port) = args.port {
            config.server.port = port;
        }

        let state = AppState::from_config(&config).await?;

        Ok(Self { config, state })
    }

    /// Run the application
    pub async fn run(self) -> Result<()> {
        info!(
            max_attempts = self.config.webhook.max_attempts,
            failure_threshold = self.config.webhook.failure_threshold,
            "Webhook delivery configured"
        );

        let server = Server::new(self.config.server.address(), self.state);
        server.run().await?;

        Ok(())
    }
}
