//! Consumer Errors

use rdkafka::error::KafkaError;

use crate::codec::DecodeError;
use crate::store::StoreError;

/// Errors that prevent establishing a subscription
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// Broker client could not be created or used
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// Every connection attempt failed
    #[error("Could not subscribe to {topic} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        topic: String,
        attempts: u32,
        last_error: String,
    },

    /// A blocking broker call could not be scheduled
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// `shutdown` has already been called
    #[error("Consumer manager is shutting down")]
    ShuttingDown,
}

/// Errors raised while handling one delivered message
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Persist failed: {0}")]
    Store(#[from] StoreError),
}
