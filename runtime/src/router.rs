//! Event router: rule evaluation and independent per-target dispatch.
//!
//! # Dispatch Model
//!
//! ```text
//!                      ┌─ rule A ─┬─▶ task (A, t1) ─▶ handler ─▶ retry loop
//!  Envelope ─▶ match ──┤          └─▶ task (A, t2) ─▶ handler ─▶ retry loop
//!                      └─ rule B ───▶ task (B, t3) ─▶ handler ─▶ retry loop
//!                                         │
//!                                         ▼
//!                              Delivered | Rejected | DeadLettered
//! ```
//!
//! Every `(envelope, target)` pair runs in its own spawned task. Tasks are
//! joined only to build the [`RouteReport`]: a slow, failing or panicking
//! target never delays or fails its siblings.
//!
//! Delivery is at-least-once. The router does not deduplicate and gives no
//! ordering guarantee between rules or between envelopes.
//!
//! # Shutdown
//!
//! Envelopes handed over with [`EventRouter::submit`] are counted until every
//! dispatch reaches a terminal outcome. [`EventRouter::shutdown`] refuses new
//! submissions and waits for that count to reach zero.

use crate::dead_letter::{DeadLetter, DeadLetterQueue, DeadLetterReason};
use crate::error::RouterError;
use crate::metrics::RouterMetrics;
use crate::rule::{Rule, Target};
use crate::HealthCheck;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use orderbus_core::environment::{Clock, SystemClock};
use orderbus_core::envelope::{Envelope, EnvelopeId};
use orderbus_core::handler::HandlerError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;

/// Terminal disposition of one `(envelope, target)` dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler succeeded
    Delivered,
    /// The handler failed permanently; not retried
    Rejected {
        /// The permanent error
        error: HandlerError,
    },
    /// Retry or age budget ran out, or the task panicked or was cancelled
    DeadLettered {
        /// Why the dispatch was abandoned
        reason: DeadLetterReason,
    },
}

impl DispatchOutcome {
    /// Whether the handler succeeded.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Whether the dispatch was abandoned.
    #[must_use]
    pub const fn is_dead_lettered(&self) -> bool {
        matches!(self, Self::DeadLettered { .. })
    }
}

/// Result of one `(envelope, target)` dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Rule that matched
    pub rule: String,
    /// Target that ran
    pub target: String,
    /// Envelope that was dispatched
    pub envelope_id: EnvelopeId,
    /// Handler invocations made
    pub attempts: u32,
    /// Terminal disposition
    pub outcome: DispatchOutcome,
}

/// Everything that happened to one routed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteReport {
    /// The routed envelope
    pub envelope_id: EnvelopeId,
    /// Names of every rule whose pattern matched
    pub matched_rules: Vec<String>,
    /// One report per `(rule, target)` pair, in declaration order
    pub dispatches: Vec<DispatchReport>,
}

impl RouteReport {
    /// Find the dispatch for a target name.
    #[must_use]
    pub fn dispatch(&self, target: &str) -> Option<&DispatchReport> {
        self.dispatches.iter().find(|d| d.target == target)
    }

    /// Target names that were dispatched to, in declaration order.
    #[must_use]
    pub fn targets(&self) -> Vec<&str> {
        self.dispatches.iter().map(|d| d.target.as_str()).collect()
    }

    /// Whether every dispatch was delivered (vacuously true with none).
    #[must_use]
    pub fn all_delivered(&self) -> bool {
        self.dispatches.iter().all(|d| d.outcome.is_delivered())
    }
}

struct RouterInner {
    rules: Vec<Rule>,
    dead_letters: DeadLetterQueue,
    clock: Arc<dyn Clock>,
    shutdown: AtomicBool,
    in_flight: AtomicUsize,
}

/// Counts one submitted envelope until its routing task ends, however it ends.
struct InFlightGuard(Arc<RouterInner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let remaining = self.0.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        RouterMetrics::record_in_flight(remaining);
    }
}

/// Routes envelopes to the targets of every matching rule.
///
/// Cloning is cheap; clones share rules, clock and dead letter queue.
///
/// # Example
///
/// ```ignore
/// let router = EventRouter::builder()
///     .rule(new_order_rule)
///     .rule(audit_rule)
///     .dead_letters(DeadLetterQueue::new(1000))
///     .build()?;
///
/// let report = router.route(envelope).await;
/// ```
#[derive(Clone)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("rules", &self.inner.rules)
            .field("dead_letters", &self.inner.dead_letters.len())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl EventRouter {
    /// Start building a router.
    #[must_use]
    pub fn builder() -> EventRouterBuilder {
        EventRouterBuilder::default()
    }

    /// Registered rules, in registration order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.inner.rules
    }

    /// The shared dead letter queue.
    #[must_use]
    pub fn dead_letters(&self) -> &DeadLetterQueue {
        &self.inner.dead_letters
    }

    /// Route `envelope` and wait for every dispatch to reach a terminal outcome.
    ///
    /// Never fails: handler errors, exhausted budgets and panics are reported
    /// per dispatch.
    pub async fn route(&self, envelope: Envelope) -> RouteReport {
        let envelope_id = envelope.id();
        let span = tracing::info_span!("route", envelope_id = %envelope_id);

        async move {
            let envelope = Arc::new(envelope);
            let matched: Vec<&Rule> = self
                .inner
                .rules
                .iter()
                .filter(|rule| rule.matches(&envelope))
                .collect();

            RouterMetrics::record_envelope(matched.len());
            tracing::debug!(
                source = envelope.source(),
                detail_type = envelope.detail_type(),
                matched_rules = matched.len(),
                "Routing envelope"
            );

            let mut running = Vec::new();
            for rule in &matched {
                for target in rule.targets() {
                    let attempts = Arc::new(AtomicU32::new(0));
                    let dispatch = Dispatch {
                        envelope: Arc::clone(&envelope),
                        rule: rule.name().to_string(),
                        target: target.clone(),
                        dead_letters: self.inner.dead_letters.clone(),
                        clock: Arc::clone(&self.inner.clock),
                        attempts: Arc::clone(&attempts),
                    };
                    let span = tracing::info_span!(
                        "dispatch",
                        rule = rule.name(),
                        target = target.name()
                    );
                    let handle = tokio::spawn(dispatch.run().instrument(span));
                    running.push((rule.name(), target.name(), attempts, handle));
                }
            }

            let (pending, handles): (Vec<_>, Vec<_>) = running
                .into_iter()
                .map(|(rule, target, attempts, handle)| ((rule, target, attempts), handle))
                .unzip();
            let joined = join_all(handles).await;

            let dispatches = pending
                .into_iter()
                .zip(joined)
                .map(|((rule, target, attempts), joined)| match joined {
                    Ok(report) => report,
                    Err(join_error) => self.task_failed(
                        &envelope,
                        rule,
                        target,
                        attempts.load(Ordering::SeqCst),
                        &join_error,
                    ),
                })
                .collect();

            RouteReport {
                envelope_id,
                matched_rules: matched.iter().map(|r| r.name().to_string()).collect(),
                dispatches,
            }
        }
        .instrument(span)
        .await
    }

    /// Fire-and-forget variant of [`route`](Self::route).
    ///
    /// Spawns the routing work and returns immediately. The handle can be
    /// awaited for the report or dropped. The envelope counts as in flight
    /// until the spawned task ends.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ShutdownInProgress`] once
    /// [`shutdown`](Self::shutdown) has been called.
    pub fn submit(&self, envelope: Envelope) -> Result<JoinHandle<RouteReport>, RouterError> {
        // Count first so a concurrent shutdown either sees this envelope or refuses it.
        let in_flight = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = InFlightGuard(Arc::clone(&self.inner));

        if self.inner.shutdown.load(Ordering::SeqCst) {
            drop(guard);
            RouterMetrics::record_refused();
            tracing::warn!(envelope_id = %envelope.id(), "Router shutting down, envelope refused");
            return Err(RouterError::ShutdownInProgress);
        }
        RouterMetrics::record_in_flight(in_flight);

        let router = self.clone();
        Ok(tokio::spawn(async move {
            let _guard = guard;
            router.route(envelope).await
        }))
    }

    /// Submitted envelopes whose routing has not finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Stop accepting submissions and wait for in-flight envelopes to finish.
    ///
    /// Every dispatch still running, including ones sleeping in retry
    /// backoff, is given until `timeout` to reach a terminal outcome.
    /// Calling it again re-runs the wait.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ShutdownTimeout`] with the number of envelopes
    /// still routing when `timeout` expires.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), RouterError> {
        tracing::info!(in_flight = self.in_flight(), "Draining event router");
        self.inner.shutdown.store(true, Ordering::SeqCst);

        let started = Instant::now();
        let poll_interval = Duration::from_millis(20);

        loop {
            let pending = self.in_flight();
            if pending == 0 {
                tracing::info!("Event router drained");
                RouterMetrics::record_shutdown("completed");
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                tracing::error!(in_flight = pending, "Router drain timed out");
                RouterMetrics::record_shutdown("timeout");
                return Err(RouterError::ShutdownTimeout(pending));
            }

            tracing::debug!(
                in_flight = pending,
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "Waiting for dispatches to finish"
            );
            tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
        }
    }

    /// Health of the router, judged by its dead letter queue.
    ///
    /// - empty queue: healthy
    /// - non-empty queue: degraded
    /// - queue at capacity: unhealthy
    #[must_use]
    pub fn health(&self) -> HealthCheck {
        let dlq = &self.inner.dead_letters;
        let size = dlq.len();
        let capacity = dlq.max_size();

        let check = if size >= capacity {
            HealthCheck::unhealthy("router", "Dead letter queue is full")
        } else if size > 0 {
            HealthCheck::degraded(
                "router",
                format!("{size} dispatches in dead letter queue"),
            )
        } else {
            HealthCheck::healthy("router")
        };

        check
            .with_metadata("rules", self.inner.rules.len().to_string())
            .with_metadata("dlq_size", size.to_string())
            .with_metadata("dlq_capacity", capacity.to_string())
    }

    fn task_failed(
        &self,
        envelope: &Envelope,
        rule: &str,
        target: &str,
        attempts: u32,
        join_error: &JoinError,
    ) -> DispatchReport {
        let reason = join_failure_reason(join_error);
        if join_error.is_cancelled() {
            tracing::warn!(rule, target, attempts, "Dispatch task cancelled");
        } else {
            tracing::error!(
                rule,
                target,
                attempts,
                error = %join_error,
                "Dispatch task panicked"
            );
        }

        RouterMetrics::record_dead_lettered(target, reason.as_str());
        self.inner.dead_letters.push(DeadLetter::new(
            envelope,
            rule,
            target,
            reason.clone(),
            attempts,
            Some(join_error.to_string()),
            None,
            self.inner.clock.now(),
        ));

        DispatchReport {
            rule: rule.to_string(),
            target: target.to_string(),
            envelope_id: envelope.id(),
            attempts,
            outcome: DispatchOutcome::DeadLettered { reason },
        }
    }
}

/// A dispatch task that did not return ended in a panic or a cancellation.
fn join_failure_reason(join_error: &JoinError) -> DeadLetterReason {
    if join_error.is_cancelled() {
        DeadLetterReason::TaskCancelled
    } else {
        DeadLetterReason::TaskPanicked
    }
}

/// One `(envelope, target)` pair, owned by its task.
struct Dispatch {
    envelope: Arc<Envelope>,
    rule: String,
    target: Target,
    dead_letters: DeadLetterQueue,
    clock: Arc<dyn Clock>,
    attempts: Arc<AtomicU32>,
}

impl Dispatch {
    async fn run(self) -> DispatchReport {
        let started = Instant::now();
        let policy = self.target.retry().clone();
        let target = self.target.name().to_string();
        let mut first_failed_at: Option<DateTime<Utc>> = None;
        let mut last_error: Option<HandlerError> = None;

        RouterMetrics::record_dispatch(&self.rule, &target);

        loop {
            let age = self.envelope.age_at(self.clock.now());
            if policy.is_expired(age) {
                return self.abandon(
                    DeadLetterReason::age_exceeded(age),
                    last_error.as_ref(),
                    first_failed_at,
                );
            }

            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            RouterMetrics::record_attempt(&target);

            match self.target.handler().handle(&self.envelope).await {
                Ok(()) => {
                    RouterMetrics::record_delivered(&target, started.elapsed());
                    tracing::debug!(attempt, "Dispatch delivered");
                    return self.report(DispatchOutcome::Delivered);
                }
                Err(error) if !error.is_retryable() => {
                    tracing::warn!(
                        attempt,
                        kind = error.kind(),
                        error = %error,
                        "Dispatch rejected"
                    );
                    RouterMetrics::record_rejected(&target, error.kind());
                    let now = self.clock.now();
                    self.dead_letters.push(DeadLetter::new(
                        &self.envelope,
                        &self.rule,
                        &target,
                        DeadLetterReason::Rejected,
                        attempt,
                        Some(error.to_string()),
                        Some(first_failed_at.unwrap_or(now)),
                        now,
                    ));
                    return self.report(DispatchOutcome::Rejected { error });
                }
                Err(error) => {
                    first_failed_at.get_or_insert_with(|| self.clock.now());

                    if !policy.should_retry(attempt) {
                        return self.abandon(
                            DeadLetterReason::RetriesExhausted,
                            Some(&error),
                            first_failed_at,
                        );
                    }

                    let delay = policy.delay_for_attempt(attempt - 1);
                    tracing::warn!(
                        attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Dispatch failed, retrying"
                    );
                    RouterMetrics::record_retry(&target);
                    last_error = Some(error);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn abandon(
        &self,
        reason: DeadLetterReason,
        last_error: Option<&HandlerError>,
        first_failed_at: Option<DateTime<Utc>>,
    ) -> DispatchReport {
        let attempts = self.attempts.load(Ordering::SeqCst);
        RouterMetrics::record_dead_lettered(self.target.name(), reason.as_str());

        self.dead_letters.push(DeadLetter::new(
            &self.envelope,
            &self.rule,
            self.target.name(),
            reason.clone(),
            attempts,
            last_error.map(ToString::to_string),
            first_failed_at,
            self.clock.now(),
        ));

        self.report(DispatchOutcome::DeadLettered { reason })
    }

    fn report(&self, outcome: DispatchOutcome) -> DispatchReport {
        DispatchReport {
            rule: self.rule.clone(),
            target: self.target.name().to_string(),
            envelope_id: self.envelope.id(),
            attempts: self.attempts.load(Ordering::SeqCst),
            outcome,
        }
    }
}

/// Builder for [`EventRouter`].
pub struct EventRouterBuilder {
    rules: Vec<Rule>,
    dead_letters: Option<DeadLetterQueue>,
    clock: Option<Arc<dyn Clock>>,
}

impl Default for EventRouterBuilder {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            dead_letters: None,
            clock: None,
        }
    }
}

impl EventRouterBuilder {
    /// Register a rule.
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Register several rules.
    #[must_use]
    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Use a shared dead letter queue (default: a new queue of 1000 entries).
    #[must_use]
    pub fn dead_letters(mut self, dead_letters: DeadLetterQueue) -> Self {
        self.dead_letters = Some(dead_letters);
        self
    }

    /// Use a custom clock (default: [`SystemClock`]).
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the router.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] if two rules share a name, or two targets of the
    /// same rule share a name (reports are keyed by rule and target).
    pub fn build(self) -> Result<EventRouter, RouterError> {
        let mut rule_names = HashSet::new();
        for rule in &self.rules {
            if !rule_names.insert(rule.name()) {
                return Err(RouterError::DuplicateRule(rule.name().to_string()));
            }

            let mut target_names = HashSet::new();
            for target in rule.targets() {
                if !target_names.insert(target.name()) {
                    return Err(RouterError::DuplicateTarget {
                        rule: rule.name().to_string(),
                        target: target.name().to_string(),
                    });
                }
            }
        }

        tracing::info!(rules = self.rules.len(), "Event router built");

        Ok(EventRouter {
            inner: Arc::new(RouterInner {
                rules: self.rules,
                dead_letters: self.dead_letters.unwrap_or_default(),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                shutdown: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
            }),
        })
    }
}
