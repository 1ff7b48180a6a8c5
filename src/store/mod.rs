//! Record Store module
//!
//! Exactly-once persistence of addition events plus the aggregate and
//! paginated reads served from them.

mod error;
#[cfg(test)]
pub(crate) mod memory;
mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{AggregateSnapshot, PersistOutcome, SummationRecord, SummationRecordInput};

pub use error::StoreError;
pub use postgres::PgSummationStore;

/// Durable, append-only storage of summation records
///
/// Implementations must treat a repeated `event_id` as a successful no-op
/// and order every listing newest `recorded_at` first.
#[async_trait]
pub trait SummationStore: Send + Sync {
    /// Write a record, or return the existing one if its event id is known
    async fn persist(&self, input: SummationRecordInput) -> Result<PersistOutcome, StoreError>;

    /// Sum, count and latest `recorded_at` over all rows
    async fn aggregate(&self) -> Result<AggregateSnapshot, StoreError>;

    /// Smallest and largest `result`, `(0, 0)` when empty
    async fn min_max(&self) -> Result<(Decimal, Decimal), StoreError>;

    /// Up to `limit` newest records
    async fn recent(&self, limit: i64) -> Result<Vec<SummationRecord>, StoreError>;

    /// One page of records and the total row count
    async fn page(
        &self,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<SummationRecord>, i64), StoreError>;
}
