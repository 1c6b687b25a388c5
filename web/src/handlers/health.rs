//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use axum::{extract::State, http::StatusCode, Json};
use orderbus_runtime::{EventRouter, HealthReport, HealthStatus};

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the service is running.
/// This endpoint does NOT check dependencies (store, dead letters).
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness check driven by the event router.
///
/// # Status Codes
///
/// - 200 OK: Healthy or Degraded (dead letters present)
/// - 503 Service Unavailable: Unhealthy (dead letter queue full)
///
/// # Endpoint
///
/// ```text
/// GET /health/ready
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "degraded",
///   "checks": [
///     {
///       "component": "router",
///       "status": "degraded",
///       "message": "1 dispatches in dead letter queue",
///       "metadata": [["rules", "3"], ["dlq_size", "1"], ["dlq_capacity", "1000"]]
///     }
///   ],
///   "timestamp": "2025-01-01T00:00:00Z"
/// }
/// ```
#[allow(clippy::unused_async)]
pub async fn readiness_check(
    State(router): State<EventRouter>,
) -> (StatusCode, Json<HealthReport>) {
    let report = HealthReport::new(vec![router.health()]);

    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(report))
}
