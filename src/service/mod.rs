//! Summation Service
//!
//! Orchestrates the consumer, codec and record store. The API layer talks to
//! nothing else.

mod error;
pub mod health;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::codec::{self, Decoded};
use crate::consumer::{Delivery, EventSource, HandlerError, MessageHandler};
use crate::domain::{
    AggregateSnapshot, Pagination, RecordPage, SummationRecord, SummationRecordInput,
    SummationStats,
};
use crate::store::SummationStore;

pub use error::QueryError;
pub use health::{ConsumerStatus, HealthSnapshot, HealthState};

/// Topic carrying calculator events
pub const TOPIC: &str = "calculator-events";

/// Consumer group of this service
pub const GROUP_ID: &str = "summation-service-group";

pub const DEFAULT_STATS_LIMIT: i64 = 10;
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 1000;

/// What the handler did with one payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Stored(SummationRecord),
    /// Event id already persisted; redelivery
    Duplicate(SummationRecord),
    /// Not an addition event
    Ignored,
}

#[derive(Clone)]
pub struct SummationService {
    store: Arc<dyn SummationStore>,
    source: Arc<dyn EventSource>,
    health: Arc<HealthState>,
    topic: String,
    group_id: String,
}

impl SummationService {
    pub fn new(store: Arc<dyn SummationStore>, source: Arc<dyn EventSource>) -> Self {
        Self {
            store,
            source,
            health: Arc::new(HealthState::new()),
            topic: TOPIC.to_string(),
            group_id: GROUP_ID.to_string(),
        }
    }

    /// Override the subscription target
    pub fn with_subscription(mut self, topic: impl Into<String>, group_id: impl Into<String>) -> Self {
        self.topic = topic.into();
        self.group_id = group_id.into();
        self
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Subscribe to the calculator topic.
    ///
    /// Failure is logged and recorded in health state, never propagated; the
    /// read path stays available without a consumer.
    pub async fn start(&self) -> ConsumerStatus {
        self.health.set_status(ConsumerStatus::Subscribing);

        let handler: Arc<dyn MessageHandler> = Arc::new(self.clone());
        let status = match self
            .source
            .subscribe(&self.topic, &self.group_id, handler)
            .await
        {
            Ok(()) => {
                tracing::info!(topic = %self.topic, "Successfully subscribed to topic");
                ConsumerStatus::Connected
            }
            Err(e) => {
                tracing::error!(
                    topic = %self.topic,
                    group_id = %self.group_id,
                    error = %e,
                    "Failed to subscribe to Kafka topic"
                );
                ConsumerStatus::Disconnected
            }
        };

        self.health.set_status(status);
        status
    }

    /// Stop the consumer and wait for in-flight messages
    pub async fn shutdown(&self) {
        self.source.shutdown().await;
    }

    // =========================================================================
    // Message handling
    // =========================================================================

    /// Decode a payload and persist it if it is an addition event
    pub async fn handle_payload(&self, raw: &[u8]) -> Result<HandleOutcome, HandlerError> {
        let message = match codec::decode(raw)? {
            Decoded::Addition(message) => message,
            Decoded::Ignored { event_type } => {
                tracing::debug!(event_type = %event_type, "Ignoring event");
                return Ok(HandleOutcome::Ignored);
            }
        };

        let event = &message.payload;
        let outcome = self
            .store
            .persist(SummationRecordInput::from_event(event))
            .await?;

        // Redeliveries still count as received messages
        self.health.record_message(Utc::now());

        if outcome.is_duplicate() {
            let record = outcome.into_record();
            tracing::debug!(
                event_id = %record.event_id,
                record_id = record.id,
                "Event already stored, skipping redelivery"
            );
            return Ok(HandleOutcome::Duplicate(record));
        }

        let record = outcome.into_record();
        tracing::info!(
            record_id = record.id,
            event_id = %record.event_id,
            "Stored addition: {} + {} = {}",
            event.operand1,
            event.operand2,
            event.result
        );

        Ok(HandleOutcome::Stored(record))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_summation(&self) -> Result<AggregateSnapshot, QueryError> {
        Ok(self.store.aggregate().await?)
    }

    /// Snapshot, extremes and the `limit` newest records (default 10)
    pub async fn get_stats(&self, limit: Option<i64>) -> Result<SummationStats, QueryError> {
        let limit = checked_limit("limit", limit.unwrap_or(DEFAULT_STATS_LIMIT))?;

        let (snapshot, (min_result, max_result), recent_operations) = tokio::try_join!(
            self.store.aggregate(),
            self.store.min_max(),
            self.store.recent(limit),
        )?;

        Ok(SummationStats {
            snapshot,
            min_result,
            max_result,
            recent_operations,
        })
    }

    /// One page of records, newest first (defaults: page 1, 50 per page)
    pub async fn get_all_records(
        &self,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<RecordPage, QueryError> {
        let page = page.unwrap_or(1);
        if page < 1 {
            return Err(QueryError::InvalidArgument(format!(
                "page must be at least 1 (got {page})"
            )));
        }
        let limit = checked_limit("limit", limit.unwrap_or(DEFAULT_PAGE_SIZE))?;

        let (records, total) = self.store.page(page, limit).await?;

        Ok(RecordPage {
            records,
            pagination: Pagination::new(page, limit, total),
        })
    }

    pub fn get_health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }
}

#[async_trait]
impl MessageHandler for SummationService {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let raw = delivery.payload.as_deref().unwrap_or_default();
        self.handle_payload(raw).await.map(|_| ())
    }
}

/// Reject non-positive limits and clamp large ones
fn checked_limit(name: &str, limit: i64) -> Result<i64, QueryError> {
    if limit < 1 {
        return Err(QueryError::InvalidArgument(format!(
            "{name} must be at least 1 (got {limit})"
        )));
    }
    Ok(limit.min(MAX_PAGE_SIZE))
}
