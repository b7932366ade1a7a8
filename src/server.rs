use crate::aggregator::Aggregator;
use crate::error::AggregatorError;
use crate::query::RawQueryParams;
use axum::{
    extract::Query,
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Extension, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "event-aggregator",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Search endpoint: validates raw parameters and runs the aggregation
/// pipeline. Partial provider failure is still a 200; only a malformed
/// query or total provider failure surfaces as an error status.
async fn search(
    Extension(aggregator): Extension<Arc<Aggregator>>,
    Query(params): Query<RawQueryParams>,
) -> axum::response::Response {
    match aggregator.search_raw(&params).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(AggregatorError::Validation(messages)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "errors": messages })),
        )
            .into_response(),
        Err(AggregatorError::AllProvidersFailed) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({
                "events": [],
                "totalCount": 0,
                "hasMore": false,
                "sources": HashMap::<String, usize>::new(),
                "error": "event search is temporarily unavailable"
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Search failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}

async fn prometheus_metrics(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}

/// Install the Prometheus recorder. Call once at startup, before any
/// metric is emitted.
pub fn init_metrics() -> Result<PrometheusHandle, AggregatorError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AggregatorError::Config(format!("Failed to install metrics recorder: {e}")))
}

/// Create the HTTP server with all routes.
pub fn create_server(aggregator: Arc<Aggregator>, metrics_handle: PrometheusHandle) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/search", get(search))
        .route("/metrics", get(prometheus_metrics))
        .layer(Extension(aggregator))
        .layer(Extension(metrics_handle))
        .layer(cors)
}
