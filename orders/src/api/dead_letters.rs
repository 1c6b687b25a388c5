//! Dead letter inspection.

use crate::server::AppState;
use axum::{extract::State, Json};
use orderbus_runtime::DeadLetter;

/// Non-destructive snapshot of the dead letter queue, oldest first.
///
/// ```text
/// GET /dead-letters
/// ```
#[allow(clippy::unused_async)]
pub async fn list_dead_letters(State(state): State<AppState>) -> Json<Vec<DeadLetter>> {
    Json(state.router.dead_letters().snapshot())
}
