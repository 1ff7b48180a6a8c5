//! Process-local health state
//!
//! Not persisted; resets on restart. Written only by the service's
//! subscription path and message handler, read by anyone.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

const NO_MESSAGE: i64 = i64::MIN;

/// Lifecycle of the service's broker subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConsumerStatus {
    Uninitialized = 0,
    Subscribing = 1,
    Connected = 2,
    /// Subscription failed; terminal for this process
    Disconnected = 3,
}

impl ConsumerStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConsumerStatus::Subscribing,
            2 => ConsumerStatus::Connected,
            3 => ConsumerStatus::Disconnected,
            _ => ConsumerStatus::Uninitialized,
        }
    }
}

impl std::fmt::Display for ConsumerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumerStatus::Uninitialized => write!(f, "uninitialized"),
            ConsumerStatus::Subscribing => write!(f, "subscribing"),
            ConsumerStatus::Connected => write!(f, "connected"),
            ConsumerStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[derive(Debug)]
pub struct HealthState {
    status: AtomicU8,
    messages_processed: AtomicU64,
    /// Epoch millis of the last stored message, `NO_MESSAGE` if none
    last_message_ms: AtomicI64,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            status: AtomicU8::new(ConsumerStatus::Uninitialized as u8),
            messages_processed: AtomicU64::new(0),
            last_message_ms: AtomicI64::new(NO_MESSAGE),
        }
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConsumerStatus {
        ConsumerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: ConsumerStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Count one stored message received at `at`
    pub(crate) fn record_message(&self, at: DateTime<Utc>) {
        self.last_message_ms
            .fetch_max(at.timestamp_millis(), Ordering::AcqRel);
        self.messages_processed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn consumer_connected(&self) -> bool {
        self.status() == ConsumerStatus::Connected
    }

    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Acquire)
    }

    pub fn last_message_received_at(&self) -> Option<DateTime<Utc>> {
        match self.last_message_ms.load(Ordering::Acquire) {
            NO_MESSAGE => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let consumer_status = self.status();
        HealthSnapshot {
            status: "healthy",
            service: SERVICE_NAME,
            consumer_status,
            consumer_connected: consumer_status == ConsumerStatus::Connected,
            last_message_received_at: self.last_message_received_at(),
            total_messages_processed: self.messages_processed(),
            timestamp: Utc::now(),
        }
    }
}

/// Service name reported by the health endpoint
pub const SERVICE_NAME: &str = "summation-service";

/// Point-in-time view of [`HealthState`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub service: &'static str,
    pub consumer_status: ConsumerStatus,
    pub consumer_connected: bool,
    pub last_message_received_at: Option<DateTime<Utc>>,
    pub total_messages_processed: u64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let health = HealthState::new();
        let snapshot = health.snapshot();

        assert_eq!(snapshot.consumer_status, ConsumerStatus::Uninitialized);
        assert!(!snapshot.consumer_connected);
        assert!(snapshot.last_message_received_at.is_none());
        assert_eq!(snapshot.total_messages_processed, 0);
    }

    #[test]
    fn test_record_message_is_monotonic() {
        let health = HealthState::new();
        let later: DateTime<Utc> = "2025-06-01T10:00:00Z".parse().unwrap();
        let earlier: DateTime<Utc> = "2025-06-01T09:00:00Z".parse().unwrap();

        health.record_message(later);
        health.record_message(earlier);

        assert_eq!(health.messages_processed(), 2);
        assert_eq!(health.last_message_received_at(), Some(later));
    }

    #[test]
    fn test_status_transitions() {
        let health = HealthState::new();
        health.set_status(ConsumerStatus::Subscribing);
        assert!(!health.consumer_connected());

        health.set_status(ConsumerStatus::Connected);
        assert!(health.consumer_connected());
        assert_eq!(health.status().to_string(), "connected");
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let json = serde_json::to_value(HealthState::new().snapshot()).unwrap();
        assert_eq!(json["consumerConnected"], serde_json::json!(false));
        assert_eq!(json["consumerStatus"], serde_json::json!("uninitialized"));
        assert_eq!(json["totalMessagesProcessed"], serde_json::json!(0));
        assert!(json["lastMessageReceivedAt"].is_null());
        assert_eq!(json["service"], serde_json::json!("summation-service"));
    }
}
