//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the routing pipeline:
//! - Rule matching and target dispatch
//! - Handler attempts, retries and terminal outcomes
//! - Dead letter queue size and churn
//! - Projection store operations
//!
//! # Example
//!
//! ```rust,no_run
//! use orderbus_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Serve `server.render()` from a `/metrics` route.
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
    /// Failed to bind HTTP server
    #[error("Failed to bind metrics server: {0}")]
    Bind(#[from] std::io::Error),
}

/// Prometheus recorder plus the address its scrape endpoint should listen on.
///
/// The server itself only installs the global recorder; the binary mounts
/// [`render`](Self::render) on an HTTP route at [`addr`](Self::addr).
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint should bind to.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this logs a
    /// warning and returns `Ok` without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "ingress_envelopes_total",
        "Envelopes accepted by the HTTP ingress"
    );
    describe_counter!(
        "router_envelopes_total",
        "Total number of envelopes routed"
    );
    describe_counter!(
        "router_unmatched_total",
        "Envelopes that matched no rule"
    );
    describe_counter!(
        "router_dispatches_total",
        "Dispatches started, per rule and target"
    );
    describe_counter!(
        "router_attempts_total",
        "Handler invocations, per rule and target"
    );
    describe_counter!(
        "router_retries_total",
        "Retries scheduled after a retryable failure"
    );
    describe_counter!(
        "router_delivered_total",
        "Dispatches that completed successfully"
    );
    describe_counter!(
        "router_rejected_total",
        "Dispatches that failed permanently"
    );
    describe_counter!(
        "router_dead_lettered_total",
        "Dispatches abandoned to the dead letter queue"
    );
    describe_histogram!(
        "router_dispatch_duration_seconds",
        "Time from first attempt to terminal outcome"
    );
    describe_gauge!(
        "router_in_flight",
        "Submitted envelopes whose dispatches have not all finished"
    );
    describe_counter!(
        "router_shutdown_total",
        "Router drains, per outcome"
    );
    describe_counter!(
        "router_refused_total",
        "Envelopes refused because the router was draining"
    );

    describe_gauge!("dlq_size", "Current dead letter queue size");
    describe_counter!("dlq_pushed_total", "Entries added to the dead letter queue");
    describe_counter!(
        "dlq_dropped_total",
        "Entries dropped because the queue was full"
    );
    describe_counter!("dlq_drained_total", "Entries drained from the queue");

    describe_counter!(
        "store_operations_total",
        "Projection store operations, per operation and outcome"
    );
    describe_histogram!(
        "store_operation_duration_seconds",
        "Projection store operation latency"
    );
}

/// Router metrics recorder.
pub struct RouterMetrics;

impl RouterMetrics {
    /// Record an envelope entering the router.
    pub fn record_envelope(matched_rules: usize) {
        counter!("router_envelopes_total").increment(1);
        if matched_rules == 0 {
            counter!("router_unmatched_total").increment(1);
        }
    }

    /// Record a dispatch being started.
    pub fn record_dispatch(rule: &str, target: &str) {
        counter!(
            "router_dispatches_total",
            "rule" => rule.to_string(),
            "target" => target.to_string()
        )
        .increment(1);
    }

    /// Record one handler invocation.
    pub fn record_attempt(target: &str) {
        counter!("router_attempts_total", "target" => target.to_string()).increment(1);
    }

    /// Record a retry being scheduled.
    pub fn record_retry(target: &str) {
        counter!("router_retries_total", "target" => target.to_string()).increment(1);
    }

    /// Record a successful delivery.
    pub fn record_delivered(target: &str, duration: Duration) {
        counter!("router_delivered_total", "target" => target.to_string()).increment(1);
        histogram!("router_dispatch_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a permanent failure.
    pub fn record_rejected(target: &str, error_kind: &'static str) {
        counter!(
            "router_rejected_total",
            "target" => target.to_string(),
            "kind" => error_kind
        )
        .increment(1);
    }

    /// Record an abandoned dispatch.
    pub fn record_dead_lettered(target: &str, reason: &'static str) {
        counter!(
            "router_dead_lettered_total",
            "target" => target.to_string(),
            "reason" => reason
        )
        .increment(1);
    }

    /// Record the number of submitted envelopes still routing.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_in_flight(in_flight: usize) {
        gauge!("router_in_flight").set(in_flight as f64);
    }

    /// Record a submission refused during shutdown.
    pub fn record_refused() {
        counter!("router_refused_total").increment(1);
    }

    /// Record how a drain ended.
    pub fn record_shutdown(outcome: &'static str) {
        counter!("router_shutdown_total", "outcome" => outcome).increment(1);
    }
}

/// Projection store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record one store operation and its latency.
    pub fn record_operation(operation: &'static str, ok: bool, duration: Duration) {
        let outcome = if ok { "ok" } else { "error" };
        counter!(
            "store_operations_total",
            "operation" => operation,
            "outcome" => outcome
        )
        .increment(1);
        histogram!("store_operation_duration_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert_eq!(server.addr(), addr);
    }

    #[tokio::test]
    async fn test_metrics_server_start_is_repeatable() {
        let mut first = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        let mut second = MetricsServer::new("127.0.0.1:0".parse().unwrap());

        assert!(first.start().is_ok());
        assert!(second.start().is_ok());
    }

    #[tokio::test]
    async fn test_router_metrics_render() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        server.start().unwrap();

        RouterMetrics::record_envelope(0);
        RouterMetrics::record_dispatch("new_order", "put_order");
        RouterMetrics::record_attempt("put_order");
        RouterMetrics::record_delivered("put_order", Duration::from_millis(5));
        StoreMetrics::record_operation("put_if_absent", true, Duration::from_millis(1));

        // The handle is None when another test installed the recorder first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("router_envelopes_total"));
            assert!(rendered.contains("router_delivered_total"));
            assert!(rendered.contains("store_operations_total"));
        }
    }
}
