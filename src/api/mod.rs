//! API module
//!
//! HTTP API endpoints, request ids and request tracing.

pub mod routes;

use std::time::Duration;

use axum::http::{self, HeaderName};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;

use crate::service::SummationService;

pub use routes::create_router;

/// Header carrying the per-request id, generated when the client sends none
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the application router
pub fn build_router(service: SummationService) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    // Layers run outermost first: request id -> trace -> propagate id -> cors
    Router::new()
        // Process liveness, independent of consumer and store
        .route("/health", axum::routing::get(health_check))
        .nest("/api", create_router())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &http::Request<_>| {
                            let request_id = req
                                .headers()
                                .get(REQUEST_ID_HEADER)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or_default();
                            tracing::span!(
                                Level::INFO,
                                "http",
                                method = %req.method(),
                                uri = %req.uri().path(),
                                request_id = %request_id,
                            )
                        })
                        .on_response(
                            |res: &http::Response<_>, latency: Duration, _span: &tracing::Span| {
                                tracing::info!(
                                    status = %res.status(),
                                    elapsed_ms = latency.as_millis() as u64,
                                    "response"
                                );
                            },
                        ),
                )
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(service)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
