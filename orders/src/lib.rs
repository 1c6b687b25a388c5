//! # Orderbus Orders
//!
//! The order processing service: an HTTP ingress that wraps each posted event
//! into an envelope, a routing table fanning envelopes out to the Put-Order,
//! Update-Order and audit targets, and a read API over the order projection.
//!
//! ```text
//! POST / ──▶ Envelope ──▶ EventRouter ──┬──▶ put_order    ──▶ OrderStore
//!                                       ├──▶ update_order ──▶ OrderStore
//!                                       └──▶ audit        ──▶ tracing
//!
//! GET /orders/.., /accounts/../orders, /vendors/../orders ◀── OrderStore
//! GET /dead-letters                                      ◀── DeadLetterQueue
//! ```

pub mod api;
pub mod audit;
pub mod config;
pub mod handlers;
pub mod rules;
pub mod server;

use anyhow::Context;
use config::Config;
use orderbus_core::audit::AuditSink;
use orderbus_core::environment::Clock;
use orderbus_core::projection::OrderStore;
use orderbus_runtime::{DeadLetterQueue, EventRouter};
use server::AppState;
use std::sync::Arc;

/// Wire the routing table, dead letter queue and router around `store`.
///
/// # Errors
///
/// Returns an error if a rule pattern fails to parse or the routing table
/// has duplicate rule or target names.
pub fn build_state(
    config: &Config,
    store: Arc<dyn OrderStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<AppState> {
    let rules = rules::order_rules(config, &store, audit).context("Invalid rule pattern")?;

    let router = EventRouter::builder()
        .rules(rules)
        .dead_letters(DeadLetterQueue::new(config.retry.dlq_max_size))
        .clock(Arc::clone(&clock))
        .build()
        .context("Invalid routing table")?;

    tracing::info!(
        rules = router.rules().len(),
        dlq_capacity = config.retry.dlq_max_size,
        audit_region = %config.events.audit_region,
        "Event router ready"
    );

    Ok(AppState::new(router, store, clock, config.events.clone()))
}
