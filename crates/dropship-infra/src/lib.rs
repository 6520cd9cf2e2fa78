pub mod database;

pub use database::{
    migrations::run_migrations,
    pool::create_pool,
    repositories::{PostgresDeliveryLogStore, PostgresSubscriptionStore},
};

use dropship_webhook::WebhookError;

#[derive(Debug, thiserror::Error)]
pub enum InfraError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl From<InfraError> for WebhookError {
    fn from(err: InfraError) -> Self {
        match err {
            InfraError::NotFound(id) => WebhookError::NotFound(id),
            InfraError::Configuration(msg) => WebhookError::Configuration(msg),
            other => WebhookError::Store(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, InfraError>;
