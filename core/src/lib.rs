//! # Orderbus Core
//!
//! Core types for an event-sourced order processing system.
//!
//! This crate holds the data model and the seams everything else plugs into.
//! It performs no I/O and spawns no tasks; the runtime crate drives it.
//!
//! ## Core Concepts
//!
//! - **Envelope**: Immutable, routable wrapper around a business event
//! - **Pattern**: Declarative predicate over envelope fields (rules are data)
//! - **Handler**: Async unit of work bound to a rule as a target
//! - **Projection Store**: Keyed, indexed store of materialized order records
//! - **Audit Sink**: Append-only, best-effort record of every routed envelope
//!
//! ## Data Flow
//!
//! ```text
//! producer ──▶ Envelope ──▶ Router ──┬──▶ Handler ──▶ OrderStore
//!                                    ├──▶ Handler ──▶ OrderStore
//!                                    └──▶ AuditSink
//! ```
//!
//! ## Example
//!
//! ```
//! use orderbus_core::envelope::Envelope;
//! use orderbus_core::pattern::EventPattern;
//! use serde_json::json;
//!
//! let envelope = Envelope::builder()
//!     .source("WebApp")
//!     .region("ap-southeast-2")
//!     .detail(json!({ "order": { "eventtype": "new_order" } }))
//!     .build();
//!
//! let pattern = EventPattern::new().field("detail.order.eventtype", ["new_order"]);
//! assert!(pattern.matches(&envelope));
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod audit;
pub mod envelope;
pub mod handler;
pub mod pattern;
pub mod projection;

/// Environment module - Dependency injection traits
///
/// All time-dependent decisions (event age, dead-letter timestamps) go through
/// [`Clock`](environment::Clock) so tests can pin the current time.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use orderbus_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time from the operating system.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
