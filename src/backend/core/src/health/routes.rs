//! Health check HTTP routes

use super::{HealthReport, HealthService, LivenessResponse, ReadinessResponse};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;
use tracing::error;

/// Shared health service state
pub type SharedHealthService = Arc<HealthService>;

/// Health routes, mounted at the server root.
pub fn health_routes(service: SharedHealthService) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check))
        .route("/health/ready", get(readiness_check))
        .with_state(service)
}

/// Checks walk the snapshot and query the audit sink, so they run off the
/// async executor.
async fn run_checks(service: SharedHealthService) -> Option<HealthReport> {
    match tokio::task::spawn_blocking(move || service.check_health()).await {
        Ok(report) => Some(report),
        Err(e) => {
            error!(error = %e, "Health check task failed");
            None
        }
    }
}

/// GET /health - Per-check health report
pub async fn health_check(State(service): State<SharedHealthService>) -> impl IntoResponse {
    match run_checks(service).await {
        Some(report) => {
            let status = StatusCode::from_u16(report.http_status())
                .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
            (status, Json(report)).into_response()
        }
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// GET /health/ready - Readiness probe
pub async fn readiness_check(State(service): State<SharedHealthService>) -> impl IntoResponse {
    let Some(report) = run_checks(service).await else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    let response = ReadinessResponse::from_health_report(&report);

    let status = if response.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response)).into_response()
}

/// GET /health/live - Liveness probe
pub async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(LivenessResponse::alive()))
}
