//! Application state for the order HTTP server.
//!
//! Contains the shared resources handlers need:
//! - Event router (write side: ingress submits envelopes to it)
//! - Order store (read side: query endpoints)
//! - Clock and envelope stamping settings

use crate::config::EventConfig;
use axum::extract::FromRef;
use orderbus_core::environment::Clock;
use orderbus_core::projection::OrderStore;
use orderbus_runtime::EventRouter;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via `Arc`) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Router the ingress hands envelopes to
    pub router: EventRouter,

    /// Projection store for order queries
    pub store: Arc<dyn OrderStore>,

    /// Time source for envelope timestamps
    pub clock: Arc<dyn Clock>,

    /// Source, detail type and region stamped on ingress envelopes
    pub events: Arc<EventConfig>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        router: EventRouter,
        store: Arc<dyn OrderStore>,
        clock: Arc<dyn Clock>,
        events: EventConfig,
    ) -> Self {
        Self {
            router,
            store,
            clock,
            events: Arc::new(events),
        }
    }
}

/// Lets shared handlers (readiness) extract just the router.
impl FromRef<AppState> for EventRouter {
    fn from_ref(state: &AppState) -> Self {
        state.router.clone()
    }
}
