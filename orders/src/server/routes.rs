//! Router configuration for the order service.
//!
//! Builds the complete Axum router with all endpoints.

use super::state::AppState;
use crate::api::{dead_letters, ingest, orders};
use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use orderbus_web::correlation_id_layer;
use orderbus_web::handlers::{health_check, readiness_check};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Routes:
/// - `POST /` event ingress
/// - `GET /orders/:accountid/:vendorid`
/// - `GET /accounts/:accountid/orders`
/// - `GET /vendors/:vendorid/orders`
/// - `GET /dead-letters`
/// - `GET /health`, `GET /health/ready`
///
/// Every response carries an `X-Correlation-ID` header.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/", post(ingest::ingest_event))
        .route("/orders/:account_id/:vendor_id", get(orders::get_order))
        .route("/accounts/:account_id/orders", get(orders::account_orders))
        .route("/vendors/:vendor_id/orders", get(orders::vendor_orders))
        .route("/dead-letters", get(dead_letters::list_dead_letters))
        // Health checks
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(correlation_id_layer())
}
