//! Database module
//!
//! Connectivity and schema checks. The schema itself is created by
//! `migrations/`, not by the service.

use sqlx::PgPool;

/// Table holding one row per stored addition
pub const RECORDS_TABLE: &str = "summation_records";

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check that the records table and its event id constraint exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_name = $1
        )
        "#,
    )
    .bind(RECORDS_TABLE)
    .fetch_one(pool)
    .await?;

    if !exists {
        tracing::error!("Required table '{}' does not exist", RECORDS_TABLE);
        return Ok(false);
    }

    // Idempotent inserts rely on ON CONFLICT (event_id)
    let unique: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM pg_indexes
            WHERE schemaname = current_schema()
              AND tablename = $1
              AND indexdef ILIKE 'CREATE UNIQUE INDEX%(event_id)%'
        )
        "#,
    )
    .bind(RECORDS_TABLE)
    .fetch_one(pool)
    .await?;

    if !unique {
        tracing::error!(
            "Table '{}' has no unique index on event_id. Please run migrations.",
            RECORDS_TABLE
        );
        return Ok(false);
    }

    tracing::info!("Schema verified: {}", RECORDS_TABLE);
    Ok(true)
}
