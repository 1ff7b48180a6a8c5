//! API Routes
//!
//! Read-only endpoints over the summation service. Handlers only translate
//! HTTP to service calls.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::domain::{AggregateSnapshot, RecordPage, SummationStats};
use crate::error::AppResult;
use crate::service::{HealthSnapshot, SummationService};

// =========================================================================
// Request types
// =========================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordsQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Create the API router, mounted under `/api`
pub fn create_router() -> Router<SummationService> {
    Router::new()
        .route("/summation", get(get_summation))
        .route("/summation/stats", get(get_stats))
        .route("/summation/all", get(get_all_records))
        .route("/summation/health", get(get_health))
}

// =========================================================================
// GET /summation
// =========================================================================

/// Current totals
async fn get_summation(State(service): State<SummationService>) -> AppResult<Json<AggregateSnapshot>> {
    Ok(Json(service.get_summation().await?))
}

// =========================================================================
// GET /summation/stats
// =========================================================================

/// Totals, extremes and recent operations
async fn get_stats(
    State(service): State<SummationService>,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<SummationStats>> {
    Ok(Json(service.get_stats(query.limit).await?))
}

// =========================================================================
// GET /summation/all
// =========================================================================

/// Paginated record listing, newest first
async fn get_all_records(
    State(service): State<SummationService>,
    Query(query): Query<RecordsQuery>,
) -> AppResult<Json<RecordPage>> {
    Ok(Json(service.get_all_records(query.page, query.limit).await?))
}

// =========================================================================
// GET /summation/health
// =========================================================================

async fn get_health(State(service): State<SummationService>) -> Json<HealthSnapshot> {
    Json(service.get_health())
}
