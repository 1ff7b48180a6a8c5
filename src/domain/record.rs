//! Summation records and derived statistics
//!
//! `SummationRecord` is the durable, append-only row. Everything else in this
//! module is derived from rows on every read and never stored.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use super::event_id::derive_event_id;
use super::events::AdditionEvent;

/// Fractional digits kept by the `NUMERIC(10,2)` columns
pub const DECIMAL_SCALE: u32 = 2;

/// Largest absolute value a `NUMERIC(10,2)` column can hold
pub fn max_column_value() -> Decimal {
    Decimal::new(9_999_999_999, DECIMAL_SCALE)
}

/// Round a value the way the store column does (half away from zero)
pub fn to_column_scale(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Row to be written for one addition event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummationRecordInput {
    pub operand1: Decimal,
    pub operand2: Decimal,
    pub result: Decimal,
    /// Deduplication token derived from event content
    pub event_id: String,
    pub occurred_at: DateTime<Utc>,
}

impl SummationRecordInput {
    /// Build the row for an event, normalizing values to column scale.
    pub fn from_event(event: &AdditionEvent) -> Self {
        Self {
            operand1: to_column_scale(event.operand1),
            operand2: to_column_scale(event.operand2),
            result: to_column_scale(event.result),
            event_id: derive_event_id(event),
            occurred_at: event.occurred_at,
        }
    }
}

/// Persisted addition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummationRecord {
    pub id: i32,
    #[serde(rename = "number1", with = "rust_decimal::serde::float")]
    pub operand1: Decimal,
    #[serde(rename = "number2", with = "rust_decimal::serde::float")]
    pub operand2: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub result: Decimal,
    pub event_id: String,
    #[serde(rename = "operationTimestamp")]
    pub occurred_at: DateTime<Utc>,
    #[serde(rename = "processedAt")]
    pub recorded_at: DateTime<Utc>,
}

/// Result of a persist call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// A new row was written
    Inserted(SummationRecord),
    /// A row with the same event id already existed; nothing was written
    Duplicate(SummationRecord),
}

impl PersistOutcome {
    pub fn into_record(self) -> SummationRecord {
        match self {
            PersistOutcome::Inserted(record) | PersistOutcome::Duplicate(record) => record,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, PersistOutcome::Duplicate(_))
    }
}

/// Running totals over every stored record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSnapshot {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_sum: Decimal,
    pub operation_count: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_result: Decimal,
    /// Latest `recordedAt`, `None` when nothing has been stored yet
    pub last_updated: Option<DateTime<Utc>>,
}

impl AggregateSnapshot {
    /// Derive the snapshot from store-side totals.
    ///
    /// The average is zero for an empty store and otherwise rounded to
    /// column scale.
    pub fn from_totals(
        total_sum: Decimal,
        operation_count: i64,
        last_updated: Option<DateTime<Utc>>,
    ) -> Self {
        let average_result = if operation_count > 0 {
            to_column_scale(total_sum / Decimal::from(operation_count))
        } else {
            Decimal::ZERO
        };

        Self {
            total_sum,
            operation_count,
            average_result,
            last_updated,
        }
    }

    pub fn empty() -> Self {
        Self::from_totals(Decimal::ZERO, 0, None)
    }
}

/// Snapshot plus extremes and the most recent records
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummationStats {
    #[serde(flatten)]
    pub snapshot: AggregateSnapshot,
    #[serde(with = "rust_decimal::serde::float")]
    pub min_result: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub max_result: Decimal,
    pub recent_operations: Vec<SummationRecord>,
}

/// Pagination block of a record listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    /// `limit` must be at least 1
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        Self {
            page,
            limit,
            total,
            pages,
        }
    }

    /// Rows to skip before this page, `None` if that does not fit an `i64`
    pub fn offset(page: i64, limit: i64) -> Option<i64> {
        page.checked_sub(1)?.checked_mul(limit)
    }
}

/// One page of records, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordPage {
    pub records: Vec<SummationRecord>,
    pub pagination: Pagination,
}
