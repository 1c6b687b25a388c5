//! # Orderbus Runtime
//!
//! Runtime for the orderbus event router.
//!
//! This crate evaluates routing rules against envelopes and drives every
//! matching target to a terminal outcome.
//!
//! ## Core Components
//!
//! - **Event Router**: Matches rules and spawns one task per target
//! - **Retry Policy**: Per-target attempt and event-age bounds with backoff
//! - **Dead Letter Queue**: Bounded record of abandoned dispatches
//! - **Audit Target**: Adapts an audit sink into a rule target
//! - **Metrics**: Prometheus recorder and metric helpers
//!
//! ## Example
//!
//! ```ignore
//! use orderbus_runtime::{EventRouter, Rule, Target};
//!
//! let router = EventRouter::builder()
//!     .rule(
//!         Rule::new("new_order")
//!             .pattern(EventPattern::new().field("detail.order.eventtype", ["new_order"]))
//!             .target(Target::new(put_handler)),
//!     )
//!     .build()?;
//!
//! let report = router.route(envelope).await;
//! ```

use serde::Serialize;

/// Audit sink adapter
pub mod audit;

/// Dead letter queue
pub mod dead_letter;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

/// Event routing
pub mod router;

/// Routing rules and targets
pub mod rule;

pub use audit::AuditTarget;
pub use dead_letter::{DeadLetter, DeadLetterQueue, DeadLetterReason};
pub use retry::RetryPolicy;
pub use router::{DispatchOutcome, DispatchReport, EventRouter, RouteReport};
pub use rule::{Rule, Target};

/// Error types for the router runtime
pub mod error {
    use thiserror::Error;

    /// Errors raised while assembling or stopping a router.
    ///
    /// Routing itself never fails; per-dispatch failures are outcomes.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum RouterError {
        /// Two rules share a name
        #[error("Duplicate rule name: {0}")]
        DuplicateRule(String),

        /// Two targets of one rule share a name
        #[error("Duplicate target {target} in rule {rule}")]
        DuplicateTarget {
            /// Rule name
            rule: String,
            /// Target name
            target: String,
        },

        /// The router is draining and accepts no new envelopes
        #[error("Router is shutting down")]
        ShutdownInProgress,

        /// Dispatches were still running when the drain timed out
        #[error("Shutdown timed out with {0} envelopes still routing")]
        ShutdownTimeout(usize),
    }
}

/// Health check status levels
///
/// Indicates the current health state of a component or system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is operational but experiencing issues (e.g., non-empty DLQ)
    Degraded,

    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if status is degraded
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Degraded)
    }

    /// Check if status is unhealthy
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }

    /// Get the worst status between two statuses
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    pub message: Option<String>,

    /// Optional metadata (e.g., metrics, error counts)
    pub metadata: Vec<(String, String)>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
            metadata: Vec::new(),
        }
    }

    /// Create a degraded check result
    #[must_use]
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Add metadata to the health check
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

/// Aggregated health report
///
/// Combines multiple health checks into an overall system status.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall system status (worst of all checks)
    pub status: HealthStatus,

    /// Individual component checks
    pub checks: Vec<HealthCheck>,

    /// Timestamp when report was generated
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthReport {
    /// Create a new health report from checks
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst);

        Self {
            status,
            checks,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Check if overall system is healthy
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    /// Check if overall system is degraded
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.status.is_degraded()
    }

    /// Check if overall system is unhealthy
    #[must_use]
    pub const fn is_unhealthy(&self) -> bool {
        self.status.is_unhealthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_status_wins() {
        assert_eq!(
            HealthStatus::Healthy.worst(HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Unhealthy.worst(HealthStatus::Degraded),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn report_folds_checks() {
        let report = HealthReport::new(vec![
            HealthCheck::healthy("store"),
            HealthCheck::degraded("router", "1 dispatches in dead letter queue"),
        ]);
        assert!(report.is_degraded());
        assert_eq!(report.checks.len(), 2);

        let empty = HealthReport::new(Vec::new());
        assert!(empty.is_healthy());
    }

    #[test]
    fn status_serializes_lowercase() {
        let value = serde_json::to_value(HealthStatus::Degraded).unwrap_or_default();
        assert_eq!(value, serde_json::json!("degraded"));
    }
}
