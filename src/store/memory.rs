//! In-memory record store for unit tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use crate::domain::{
    AggregateSnapshot, Pagination, PersistOutcome, SummationRecord, SummationRecordInput,
};

use super::{StoreError, SummationStore};

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    rows: Mutex<Vec<SummationRecord>>,
    failing: AtomicBool,
}

impl MemoryStore {
    /// Make every following call fail as if the database were down
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn newest_first(&self) -> Vec<SummationRecord> {
        let mut rows = self.rows.lock().unwrap().clone();
        rows.sort_by(|a, b| (b.recorded_at, b.id).cmp(&(a.recorded_at, a.id)));
        rows
    }
}

#[async_trait]
impl SummationStore for MemoryStore {
    async fn persist(&self, input: SummationRecordInput) -> Result<PersistOutcome, StoreError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();

        if let Some(existing) = rows.iter().find(|r| r.event_id == input.event_id) {
            return Ok(PersistOutcome::Duplicate(existing.clone()));
        }

        // Strictly increasing timestamps keep ordering deterministic
        let id = rows.len() as i32 + 1;
        let record = SummationRecord {
            id,
            operand1: input.operand1,
            operand2: input.operand2,
            result: input.result,
            event_id: input.event_id,
            occurred_at: input.occurred_at,
            recorded_at: Utc::now() + Duration::milliseconds(id as i64),
        };
        rows.push(record.clone());

        Ok(PersistOutcome::Inserted(record))
    }

    async fn aggregate(&self) -> Result<AggregateSnapshot, StoreError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();

        let total: Decimal = rows.iter().map(|r| r.result).sum();
        let last = rows.iter().map(|r| r.recorded_at).max();
        Ok(AggregateSnapshot::from_totals(total, rows.len() as i64, last))
    }

    async fn min_max(&self) -> Result<(Decimal, Decimal), StoreError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();

        let min = rows.iter().map(|r| r.result).min().unwrap_or(Decimal::ZERO);
        let max = rows.iter().map(|r| r.result).max().unwrap_or(Decimal::ZERO);
        Ok((min, max))
    }

    async fn recent(&self, limit: i64) -> Result<Vec<SummationRecord>, StoreError> {
        self.check()?;
        Ok(self.newest_first().into_iter().take(limit.max(0) as usize).collect())
    }

    async fn page(
        &self,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<SummationRecord>, i64), StoreError> {
        self.check()?;
        if page < 1 || page_size < 1 {
            return Err(StoreError::InvalidArgument("page".to_string()));
        }

        let rows = self.newest_first();
        let total = rows.len() as i64;
        let Some(offset) = Pagination::offset(page, page_size) else {
            return Ok((Vec::new(), total));
        };
        let slice = rows
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(page_size as usize)
            .collect();
        Ok((slice, total))
    }
}
