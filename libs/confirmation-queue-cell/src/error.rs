use std::time::Duration;
use thiserror::Error;

use shared_database::StoreError;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Connection pool error: {0}")]
    PoolError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Delivery to channel {channel} failed: {reason}")]
    DeliveryError { channel: String, reason: String },

    #[error("Persistence error: {0}")]
    PersistenceError(#[from] StoreError),

    #[error("Reconciliation failed: {0}")]
    ReconciliationError(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}
