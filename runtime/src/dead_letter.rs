//! Dead letter queue for dispatches that could not be delivered.
//!
//! An entry is recorded whenever a `(envelope, target)` pair reaches a terminal
//! failure: its retry or age budget ran out, the handler rejected it
//! permanently, or the dispatch task panicked. Recording never rolls back
//! store mutations committed by earlier attempts.
//!
//! # Features
//!
//! - Bounded queue with configurable max size
//! - FIFO ordering (oldest entries dropped when full)
//! - Thread-safe for concurrent access
//! - Metrics tracking for queue size and operations

use chrono::{DateTime, Utc};
use orderbus_core::envelope::Envelope;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Why a dispatch reached the dead letter queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Every allowed attempt failed with a retryable error
    RetriesExhausted,
    /// The envelope grew older than the target's max event age
    EventAgeExceeded {
        /// Age when the dispatch was abandoned, in milliseconds
        age_ms: u64,
    },
    /// The handler failed permanently (validation or conflict)
    Rejected,
    /// The dispatch task panicked
    TaskPanicked,
    /// The dispatch task was cancelled before finishing
    TaskCancelled,
}

impl DeadLetterReason {
    pub(crate) fn age_exceeded(age: Duration) -> Self {
        Self::EventAgeExceeded {
            age_ms: u64::try_from(age.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Short machine-readable name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RetriesExhausted => "retries_exhausted",
            Self::EventAgeExceeded { .. } => "event_age_exceeded",
            Self::Rejected => "rejected",
            Self::TaskPanicked => "task_panicked",
            Self::TaskCancelled => "task_cancelled",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dead letter queue entry.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    /// The envelope that could not be delivered
    pub envelope: Envelope,

    /// Rule that matched the envelope
    pub rule: String,

    /// Target that failed
    pub target: String,

    /// Terminal disposition
    pub reason: DeadLetterReason,

    /// Number of handler invocations made
    pub attempts: u32,

    /// The error from the last failed attempt, if any attempt ran
    pub last_error: Option<String>,

    /// When the first attempt failed, if any attempt ran
    pub first_failed_at: Option<DateTime<Utc>>,

    /// When the dispatch was abandoned
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        envelope: &Envelope,
        rule: &str,
        target: &str,
        reason: DeadLetterReason,
        attempts: u32,
        last_error: Option<String>,
        first_failed_at: Option<DateTime<Utc>>,
        dead_lettered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            envelope: envelope.clone(),
            rule: rule.to_string(),
            target: target.to_string(),
            reason,
            attempts,
            last_error,
            first_failed_at,
            dead_lettered_at,
        }
    }
}

/// Bounded, shared dead letter queue.
///
/// Cloning is cheap; clones share the same storage.
///
/// # Example
///
/// ```ignore
/// let dlq = DeadLetterQueue::new(1000);
/// let router = EventRouter::builder().dead_letters(dlq.clone()).build();
///
/// // ... route envelopes ...
///
/// for entry in dlq.snapshot() {
///     println!("{} -> {}: {}", entry.rule, entry.target, entry.reason);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DeadLetterQueue {
    queue: Arc<Mutex<VecDeque<DeadLetter>>>,
    max_size: usize,
}

impl DeadLetterQueue {
    /// Create a new dead letter queue with the given max size (at least 1).
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            max_size: max_size.max(1),
        }
    }

    /// Push an entry onto the queue.
    ///
    /// If the queue is full, the oldest entry is dropped.
    pub fn push(&self, entry: DeadLetter) {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if queue.len() >= self.max_size {
            queue.pop_front();
            metrics::counter!("dlq_dropped_total").increment(1);
            tracing::warn!(
                max_size = self.max_size,
                "DLQ at capacity, dropping oldest entry"
            );
        }

        tracing::warn!(
            envelope_id = %entry.envelope.id(),
            rule = %entry.rule,
            target = %entry.target,
            reason = %entry.reason,
            attempts = entry.attempts,
            last_error = entry.last_error.as_deref().unwrap_or(""),
            "Dispatch added to dead letter queue"
        );

        queue.push_back(entry);

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("dlq_size").set(queue.len() as f64);
        metrics::counter!("dlq_pushed_total").increment(1);
    }

    /// Get the current queue size
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Check if the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue has reached its capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.max_size
    }

    /// Copy all entries, oldest first, without removing them.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Drain all entries from the queue
    ///
    /// Returns all entries and empties the queue.
    pub fn drain(&self) -> Vec<DeadLetter> {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entries: Vec<_> = queue.drain(..).collect();

        metrics::gauge!("dlq_size").set(0.0);
        metrics::counter!("dlq_drained_total").increment(entries.len() as u64);

        tracing::info!(count = entries.len(), "Drained dead letter queue");

        entries
    }

    /// Peek at the oldest entry without removing it
    #[must_use]
    pub fn peek(&self) -> Option<DeadLetter> {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .front()
            .cloned()
    }

    /// Get the maximum queue size
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderbus_core::handler::HandlerError;
    use serde_json::json;

    fn entry(target: &str) -> DeadLetter {
        let envelope = Envelope::builder()
            .source("WebApp")
            .detail(json!({ "order": { "eventtype": "update_order" } }))
            .build();
        DeadLetter::new(
            &envelope,
            "update_order",
            target,
            DeadLetterReason::RetriesExhausted,
            2,
            Some(HandlerError::TransientStore("down".into()).to_string()),
            Some(Utc::now()),
            Utc::now(),
        )
    }

    #[test]
    fn drops_oldest_when_full() {
        let dlq = DeadLetterQueue::new(2);
        dlq.push(entry("a"));
        dlq.push(entry("b"));
        assert!(dlq.is_full());
        dlq.push(entry("c"));

        let targets: Vec<_> = dlq.snapshot().into_iter().map(|e| e.target).collect();
        assert_eq!(targets, vec!["b", "c"]);
    }

    #[test]
    fn snapshot_keeps_entries_and_drain_removes_them() {
        let dlq = DeadLetterQueue::default();
        dlq.push(entry("a"));

        assert_eq!(dlq.snapshot().len(), 1);
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq.peek().map(|e| e.target), Some("a".to_string()));

        let drained = dlq.drain();
        assert_eq!(drained.len(), 1);
        assert!(dlq.is_empty());
    }

    #[test]
    fn clones_share_storage() {
        let dlq = DeadLetterQueue::new(10);
        let clone = dlq.clone();
        clone.push(entry("a"));
        assert_eq!(dlq.len(), 1);
    }

    #[test]
    fn records_last_error_text() {
        let e = entry("a");
        assert_eq!(
            e.last_error.as_deref(),
            Some("Store temporarily unavailable: down")
        );
        assert_eq!(e.reason.as_str(), "retries_exhausted");
    }

    #[test]
    fn age_reason_serializes_with_kind_tag() {
        let reason = DeadLetterReason::age_exceeded(Duration::from_millis(1500));
        let value = serde_json::to_value(&reason).unwrap_or_default();
        assert_eq!(value, json!({ "kind": "event_age_exceeded", "age_ms": 1500 }));
    }

    #[test]
    fn cancelled_reason_is_distinct_from_panic() {
        let value = serde_json::to_value(DeadLetterReason::TaskCancelled).unwrap_or_default();
        assert_eq!(value, json!({ "kind": "task_cancelled" }));
        assert_ne!(
            DeadLetterReason::TaskCancelled.as_str(),
            DeadLetterReason::TaskPanicked.as_str()
        );
    }
}
