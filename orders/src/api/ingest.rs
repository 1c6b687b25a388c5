//! Event ingress.

use crate::server::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use orderbus_core::envelope::Envelope;
use orderbus_web::{CorrelationId, WebResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a `202 Accepted` ingress response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Envelope id assigned to the event
    pub id: String,
}

/// Accept an event.
///
/// The JSON body becomes the envelope `detail` verbatim. The envelope is
/// handed to the router and the request returns immediately: downstream
/// handler failures are never reflected in the response.
///
/// # Endpoint
///
/// ```text
/// POST /
/// Content-Type: application/json
///
/// {"order": {"eventtype": "new_order", "accountid": "A1", ...}}
/// ```
///
/// # Errors
///
/// Returns `400 Bad Request` if the body is not JSON, and
/// `503 Service Unavailable` once the router has started draining.
pub async fn ingest_event(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    payload: Result<Json<Value>, JsonRejection>,
) -> WebResult<(StatusCode, Json<IngestResponse>)> {
    let Json(detail) = payload?;

    let envelope = Envelope::builder()
        .source(state.events.source.as_str())
        .detail_type(state.events.bus_name.as_str())
        .region(state.events.region.as_str())
        .time(state.clock.now())
        .detail(detail)
        .build();
    let id = envelope.id();
    let event_type = envelope
        .field("detail.order.eventtype")
        .and_then(|value| value.as_str().map(str::to_owned));

    drop(state.router.submit(envelope)?);

    metrics::counter!("ingress_envelopes_total").increment(1);
    tracing::info!(
        envelope_id = %id,
        correlation_id = %correlation_id,
        event_type = event_type.as_deref().unwrap_or("unknown"),
        "Event accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse { id: id.to_string() }),
    ))
}
