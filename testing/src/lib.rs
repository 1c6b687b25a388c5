//! # Orderbus Testing
//!
//! Testing utilities and helpers for orderbus.
//!
//! This crate provides:
//! - Deterministic clocks
//! - Recording, failing and panicking handlers
//! - A fault-injecting wrapper for any [`OrderStore`](orderbus_core::projection::OrderStore)
//! - Envelope builders for `new_order` / `update_order` events
//! - proptest strategies for order keys and dates
//!
//! ## Example
//!
//! ```ignore
//! use orderbus_testing::{helpers, test_clock, RecordingHandler};
//!
//! #[tokio::test]
//! async fn routes_new_orders() {
//!     let handler = Arc::new(RecordingHandler::new("put_order"));
//!     let router = EventRouter::builder()
//!         .clock(Arc::new(test_clock()))
//!         .rule(Rule::new("new_order").target(Target::new(handler.clone())))
//!         .build()?;
//!
//!     router.route(helpers::new_order("A1", "V1", "2021-01-01", json!("x"))).await;
//!     assert_eq!(handler.calls(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use orderbus_core::environment::Clock;

pub mod handler_mocks;
pub mod store_mocks;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use orderbus_core::audit::AuditSink;
    use orderbus_core::envelope::Envelope;
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use orderbus_testing::mocks::FixedClock;
    /// use orderbus_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }

    /// The instant [`test_clock`] is pinned to.
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is hardcoded.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }

    /// Clock that only moves when told to.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time.
        pub fn set(&self, to: DateTime<Utc>) {
            *self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Audit sink that keeps every envelope in memory.
    #[derive(Debug, Default)]
    pub struct RecordingAuditSink {
        entries: Mutex<Vec<Envelope>>,
    }

    impl RecordingAuditSink {
        /// Create an empty sink.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Everything appended so far, in append order.
        #[must_use]
        pub fn entries(&self) -> Vec<Envelope> {
            self.entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }

        /// Number of appended envelopes.
        #[must_use]
        pub fn len(&self) -> usize {
            self.entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .len()
        }

        /// Whether nothing was appended.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl AuditSink for RecordingAuditSink {
        fn append(&self, envelope: &Envelope) {
            self.entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(envelope.clone());
        }
    }
}

/// Envelope builders for order events.
///
/// Envelopes carry the same shape the HTTP ingress produces: source `WebApp`,
/// region `ap-southeast-2`, and the order under `detail.order`.
pub mod helpers {
    use super::mocks::test_time;
    use orderbus_core::envelope::Envelope;
    use serde_json::{json, Value};

    /// Source used by the web ingress.
    pub const SOURCE: &str = "WebApp";

    /// Detail type used by the web ingress.
    pub const DETAIL_TYPE: &str = "event_sourcing_eventbridge";

    /// Region envelopes are stamped with.
    pub const REGION: &str = "ap-southeast-2";

    /// `detail` body for an order event.
    #[must_use]
    pub fn order_detail(
        event_type: &str,
        account_id: &str,
        vendor_id: &str,
        order_date: &str,
        details: Value,
    ) -> Value {
        json!({
            "order": {
                "eventtype": event_type,
                "accountid": account_id,
                "vendorid": vendor_id,
                "orderdate": order_date,
                "details": details,
            }
        })
    }

    /// Envelope carrying `detail`, timestamped at [`test_time`].
    #[must_use]
    pub fn envelope(detail: Value) -> Envelope {
        Envelope::builder()
            .source(SOURCE)
            .detail_type(DETAIL_TYPE)
            .region(REGION)
            .time(test_time())
            .detail(detail)
            .build()
    }

    /// A `new_order` envelope.
    #[must_use]
    pub fn new_order(account_id: &str, vendor_id: &str, order_date: &str, details: Value) -> Envelope {
        envelope(order_detail("new_order", account_id, vendor_id, order_date, details))
    }

    /// An `update_order` envelope.
    #[must_use]
    pub fn update_order(
        account_id: &str,
        vendor_id: &str,
        order_date: &str,
        details: Value,
    ) -> Envelope {
        envelope(order_detail("update_order", account_id, vendor_id, order_date, details))
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Short identifiers such as `A1`, `V42`.
    pub fn arb_id(prefix: &'static str) -> impl Strategy<Value = String> {
        (0u16..50).prop_map(move |n| format!("{prefix}{n}"))
    }

    /// ISO dates within 2021, sortable as strings.
    pub fn arb_order_date() -> impl Strategy<Value = String> {
        (1u8..=12, 1u8..=28).prop_map(|(m, d)| format!("2021-{m:02}-{d:02}"))
    }
}

/// Install a `tracing` subscriber for tests; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use handler_mocks::{FailingHandler, FlakyHandler, PanickingHandler, RecordingHandler};
pub use mocks::{test_clock, test_time, FixedClock, ManualClock, RecordingAuditSink};
pub use store_mocks::FaultyOrderStore;
