//! Kafka consumer group manager
//!
//! Owns one `StreamConsumer` per subscription. Offsets are stored only after
//! the handler has run, and committed by librdkafka's auto-commit, which gives
//! at-least-once delivery. Slow partitions are paused rather than allowed to
//! block the fetch loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;

use super::{Delivery, EventSource, MessageHandler, PartitionDispatcher, RetryPolicy, SubscriptionError};

const RECV_ERROR_BACKOFF: Duration = Duration::from_secs(1);
/// Queued messages at which a partition is paused
const PARTITION_HIGH_WATER: usize = 64;

struct Subscription {
    topic: String,
    group_id: String,
    consumer: Arc<StreamConsumer>,
    task: JoinHandle<()>,
}

/// Manages consumer group subscriptions against a Kafka cluster
pub struct ConsumerGroupManager {
    config: KafkaConfig,
    retry: RetryPolicy,
    shutdown_tx: watch::Sender<bool>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ConsumerGroupManager {
    pub fn new(config: KafkaConfig) -> Self {
        let retry = RetryPolicy::new(config.retry_initial(), config.retries);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            retry,
            shutdown_tx,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Number of live subscriptions
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    fn client_config(&self, group_id: &str) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.config.brokers)
            .set("client.id", &self.config.client_id)
            .set("group.id", group_id)
            // New groups replay the topic from the start
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true")
            // Offsets are stored by the partition workers after handling
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", self.config.session_timeout_ms.to_string())
            .set(
                "heartbeat.interval.ms",
                self.config.heartbeat_interval_ms.to_string(),
            );
        client_config
    }

    /// One connection attempt: create the client, reach the brokers, subscribe
    async fn connect(&self, topic: &str, group_id: &str) -> Result<StreamConsumer, SubscriptionError> {
        let consumer: StreamConsumer = self.client_config(group_id).create()?;

        let topic_name = topic.to_string();
        let timeout = self.config.metadata_timeout();
        let consumer = tokio::task::spawn_blocking(move || {
            let metadata = consumer.fetch_metadata(Some(&topic_name), timeout)?;
            if let Some(err) = metadata
                .topics()
                .iter()
                .find(|t| t.name() == topic_name)
                .and_then(|t| t.error())
            {
                warn!(topic = %topic_name, error = ?err, "Topic metadata reported an error");
            }
            Ok::<_, KafkaError>(consumer)
        })
        .await
        .map_err(|e| SubscriptionError::Runtime(e.to_string()))??;

        consumer.subscribe(&[topic])?;
        Ok(consumer)
    }
}

#[async_trait]
impl EventSource for ConsumerGroupManager {
    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscriptionError> {
        let shutting_down = *self.shutdown_tx.borrow();
        if shutting_down {
            return Err(SubscriptionError::ShuttingDown);
        }

        info!(
            topic = topic,
            group_id = group_id,
            brokers = %self.config.brokers,
            "Connecting to Kafka"
        );

        let consumer = self
            .retry
            .run("kafka_subscribe", || self.connect(topic, group_id))
            .await
            .map_err(|e| SubscriptionError::RetriesExhausted {
                topic: topic.to_string(),
                attempts: e.attempts,
                last_error: e.last_error.to_string(),
            })?;
        let consumer = Arc::new(consumer);

        info!(topic = topic, group_id = group_id, "Subscribed to topic");

        let task = tokio::spawn(consume_loop(
            consumer.clone(),
            handler,
            self.shutdown_tx.subscribe(),
        ));

        let mut subscriptions = self.subscriptions.lock().await;
        let shutting_down = *self.shutdown_tx.borrow();
        if shutting_down {
            // shutdown() already drained; the loop exits on its own and drops the client
            return Err(SubscriptionError::ShuttingDown);
        }
        subscriptions.push(Subscription {
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            consumer,
            task,
        });

        info!(topic = topic, "Started consuming messages from topic");
        Ok(())
    }

    async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let subscriptions = std::mem::take(&mut *self.subscriptions.lock().await);
        if subscriptions.is_empty() {
            debug!("No Kafka consumers to disconnect");
            return;
        }

        info!(count = subscriptions.len(), "Disconnecting Kafka consumers...");

        // Each consumer is released independently; one failure does not block the rest
        for Subscription {
            topic,
            group_id,
            consumer,
            task,
        } in subscriptions
        {
            if let Err(e) = task.await {
                error!(topic = %topic, error = %e, "Consume loop terminated abnormally");
            }

            let closed = tokio::task::spawn_blocking(move || {
                let committed = consumer.commit_consumer_state(CommitMode::Sync);
                consumer.unsubscribe();
                drop(consumer);
                committed
            })
            .await;

            match closed {
                Ok(Ok(())) | Ok(Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset))) => {
                    info!(topic = %topic, group_id = %group_id, "Kafka consumer disconnected successfully");
                }
                Ok(Err(e)) => {
                    error!(topic = %topic, group_id = %group_id, error = %e, "Error disconnecting Kafka consumer");
                }
                Err(e) => {
                    error!(topic = %topic, group_id = %group_id, error = %e, "Error disconnecting Kafka consumer");
                }
            }
        }
    }
}

/// Fetch messages until shutdown is signalled, then drain partition workers
async fn consume_loop(
    consumer: Arc<StreamConsumer>,
    handler: Arc<dyn MessageHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut dispatcher = PartitionDispatcher::new(handler, consumer.clone(), PARTITION_HIGH_WATER);

    loop {
        let stop = *shutdown.borrow();
        if stop {
            break;
        }

        let received = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            received = consumer.recv() => received.map(|message| Delivery::from_message(&message)),
        };

        match received {
            Ok(delivery) => dispatcher.dispatch(delivery),
            Err(e) => {
                error!(error = %e, "Kafka error while receiving");
                tokio::time::sleep(RECV_ERROR_BACKOFF).await;
            }
        }
    }

    info!(
        partitions = dispatcher.active_partitions(),
        "Consume loop stopping, finishing in-flight messages"
    );
    dispatcher.drain().await;
}
