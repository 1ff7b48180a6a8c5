//! PostgreSQL record store
//!
//! Reads and writes the `summation_records` table. Aggregates are computed
//! by the database, never by iterating rows in the application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::domain::{
    AggregateSnapshot, Pagination, PersistOutcome, SummationRecord, SummationRecordInput,
};

use super::{StoreError, SummationStore};

type RecordRow = (i32, Decimal, Decimal, Decimal, String, DateTime<Utc>, DateTime<Utc>);

const RECORD_COLUMNS: &str =
    "id, number1, number2, result, event_id, operation_timestamp, processed_at";

fn into_record(
    (id, operand1, operand2, result, event_id, occurred_at, recorded_at): RecordRow,
) -> SummationRecord {
    SummationRecord {
        id,
        operand1,
        operand2,
        result,
        event_id,
        occurred_at,
        recorded_at,
    }
}

/// Record store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgSummationStore {
    pool: PgPool,
}

impl PgSummationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_event_id(&self, event_id: &str) -> Result<SummationRecord, StoreError> {
        let row: RecordRow = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM summation_records WHERE event_id = $1"
        ))
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(into_record(row))
    }
}

#[async_trait]
impl SummationStore for PgSummationStore {
    async fn persist(&self, input: SummationRecordInput) -> Result<PersistOutcome, StoreError> {
        // The unique index on event_id turns redelivery into a no-op
        let inserted: Option<RecordRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO summation_records
                (number1, number2, result, event_id, operation_timestamp, processed_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (event_id) DO NOTHING
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(input.operand1)
        .bind(input.operand2)
        .bind(input.result)
        .bind(&input.event_id)
        .bind(input.occurred_at)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => Ok(PersistOutcome::Inserted(into_record(row))),
            None => {
                let existing = self.find_by_event_id(&input.event_id).await?;
                Ok(PersistOutcome::Duplicate(existing))
            }
        }
    }

    async fn aggregate(&self) -> Result<AggregateSnapshot, StoreError> {
        let (total_sum, operation_count, last_updated): (Decimal, i64, Option<DateTime<Utc>>) =
            sqlx::query_as(
                r#"
                SELECT COALESCE(SUM(result), 0), COUNT(*), MAX(processed_at)
                FROM summation_records
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(AggregateSnapshot::from_totals(
            total_sum,
            operation_count,
            last_updated,
        ))
    }

    async fn min_max(&self) -> Result<(Decimal, Decimal), StoreError> {
        let extremes: (Decimal, Decimal) = sqlx::query_as(
            r#"
            SELECT COALESCE(MIN(result), 0), COALESCE(MAX(result), 0)
            FROM summation_records
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(extremes)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<SummationRecord>, StoreError> {
        if limit < 1 {
            return Err(StoreError::InvalidArgument(format!(
                "limit must be at least 1 (got {limit})"
            )));
        }

        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM summation_records
            ORDER BY processed_at DESC, id DESC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(into_record).collect())
    }

    async fn page(
        &self,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<SummationRecord>, i64), StoreError> {
        if page < 1 || page_size < 1 {
            return Err(StoreError::InvalidArgument(format!(
                "page and page size must be at least 1 (got {page}, {page_size})"
            )));
        }

        // Count and slice must see the same snapshot
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM summation_records")
            .fetch_one(&mut *tx)
            .await?;

        // Past any possible row; only the count is meaningful
        let Some(offset) = Pagination::offset(page, page_size) else {
            tx.commit().await?;
            return Ok((Vec::new(), total));
        };

        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM summation_records
            ORDER BY processed_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(page_size)
        .bind(offset)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((rows.into_iter().map(into_record).collect(), total))
    }
}
