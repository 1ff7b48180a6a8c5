//! Consumer Group module
//!
//! Long-lived broker subscriptions that feed every fetched message to a
//! handler. Handler failures never stop the consume loop.

mod dispatch;
mod error;
mod manager;
pub mod policy;
mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use rdkafka::Message;

pub use dispatch::{process_delivery, PartitionControl, PartitionDispatcher};
pub use error::{HandlerError, SubscriptionError};
pub use manager::ConsumerGroupManager;
pub use policy::Disposition;
pub use retry::{RetryError, RetryPolicy};

/// A message fetched from the broker, detached from the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

impl Delivery {
    pub fn new(topic: &str, partition: i32, offset: i64, payload: Option<Vec<u8>>) -> Self {
        Self {
            topic: topic.to_string(),
            partition,
            offset,
            payload,
        }
    }

    pub fn from_message<M: Message>(message: &M) -> Self {
        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(<[u8]>::to_vec),
        }
    }
}

/// Receives messages one at a time per partition
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError>;
}

/// Source of broker messages for a consumer group
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Subscribe `handler` to `topic` under `group_id`.
    ///
    /// Returns once the subscription is live; consumption continues in the
    /// background until [`EventSource::shutdown`].
    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscriptionError>;

    /// Stop consuming, finish in-flight messages and disconnect
    async fn shutdown(&self);
}
