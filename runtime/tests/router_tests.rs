//! Router behaviour: rule matching, fan-out isolation, retries and dead letters.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use orderbus_core::handler::{EventHandler, HandlerError};
use orderbus_core::pattern::EventPattern;
use orderbus_runtime::error::RouterError;
use orderbus_runtime::{
    AuditTarget, DeadLetterQueue, DeadLetterReason, DispatchOutcome, EventRouter, RetryPolicy,
    Rule, Target,
};
use orderbus_testing::{
    helpers, test_clock, test_time, FailingHandler, FlakyHandler, ManualClock, PanickingHandler,
    RecordingAuditSink, RecordingHandler,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .jitter(false)
        .build()
}

fn on_event_type(event_type: &str) -> EventPattern {
    EventPattern::new().field("detail.order.eventtype", [event_type])
}

fn target(handler: Arc<dyn EventHandler>, max_attempts: u32) -> Target {
    Target::new(handler).with_retry(fast_retry(max_attempts))
}

#[tokio::test]
async fn dispatches_to_exactly_the_matching_targets() {
    let put = Arc::new(RecordingHandler::new("put_order"));
    let update = Arc::new(RecordingHandler::new("update_order"));
    let audit_sink = Arc::new(RecordingAuditSink::new());

    let router = EventRouter::builder()
        .clock(Arc::new(test_clock()))
        .rule(
            Rule::new("new_order")
                .pattern(on_event_type("new_order"))
                .target(target(put.clone(), 2)),
        )
        .rule(
            Rule::new("update_order")
                .pattern(on_event_type("update_order"))
                .target(target(update.clone(), 2)),
        )
        .rule(
            Rule::new("audit")
                .pattern(EventPattern::new().field("region", [helpers::REGION]))
                .target(Target::new(Arc::new(AuditTarget::new(audit_sink.clone())))),
        )
        .build()
        .unwrap();

    let report = router
        .route(helpers::new_order("A1", "V1", "2021-01-01", json!("x")))
        .await;

    assert_eq!(report.matched_rules, vec!["new_order", "audit"]);
    assert_eq!(report.targets(), vec!["put_order", "audit"]);
    assert!(report.all_delivered());
    assert_eq!(put.calls(), 1);
    assert_eq!(update.calls(), 0);
    assert_eq!(audit_sink.len(), 1);
}

#[tokio::test]
async fn unmatched_region_skips_audit() {
    let audit_sink = Arc::new(RecordingAuditSink::new());
    let router = EventRouter::builder()
        .clock(Arc::new(test_clock()))
        .rule(
            Rule::new("audit")
                .pattern(EventPattern::new().field("region", [helpers::REGION]))
                .target(Target::new(Arc::new(AuditTarget::new(audit_sink.clone())))),
        )
        .build()
        .unwrap();

    let envelope = orderbus_core::envelope::Envelope::builder()
        .region("us-east-1")
        .time(test_time())
        .build();
    let report = router.route(envelope).await;

    assert!(report.dispatches.is_empty());
    assert!(audit_sink.is_empty());
}

#[tokio::test]
async fn failing_target_does_not_affect_sibling() {
    let failing = Arc::new(FailingHandler::transient("failing"));
    let healthy = Arc::new(RecordingHandler::new("healthy"));
    let dlq = DeadLetterQueue::new(10);

    let router = EventRouter::builder()
        .clock(Arc::new(test_clock()))
        .dead_letters(dlq.clone())
        .rule(
            Rule::new("new_order")
                .pattern(on_event_type("new_order"))
                .target(target(failing.clone(), 2))
                .target(target(healthy.clone(), 2)),
        )
        .build()
        .unwrap();

    let report = router
        .route(helpers::new_order("A1", "V1", "2021-01-01", json!("x")))
        .await;

    let failed = report.dispatch("failing").unwrap();
    assert_eq!(
        failed.outcome,
        DispatchOutcome::DeadLettered {
            reason: DeadLetterReason::RetriesExhausted
        }
    );
    assert_eq!(report.dispatch("healthy").unwrap().outcome, DispatchOutcome::Delivered);
    assert_eq!(healthy.calls(), 1);
    assert_eq!(dlq.len(), 1);
}

#[tokio::test]
async fn two_attempts_then_dead_letter() {
    let failing = Arc::new(FailingHandler::transient("update_order"));
    let dlq = DeadLetterQueue::new(10);

    let router = EventRouter::builder()
        .clock(Arc::new(test_clock()))
        .dead_letters(dlq.clone())
        .rule(
            Rule::new("update_order")
                .pattern(on_event_type("update_order"))
                .target(target(failing.clone(), 2)),
        )
        .build()
        .unwrap();

    let envelope = helpers::update_order("A1", "V1", "2021-01-02", json!("y"));
    let envelope_id = envelope.id();
    let report = router.route(envelope).await;

    assert_eq!(failing.attempts(), 2);
    assert_eq!(report.dispatches[0].attempts, 2);

    let entry = dlq.peek().unwrap();
    assert_eq!(entry.envelope.id(), envelope_id);
    assert_eq!(entry.rule, "update_order");
    assert_eq!(entry.target, "update_order");
    assert_eq!(entry.reason, DeadLetterReason::RetriesExhausted);
    assert_eq!(entry.attempts, 2);
    assert!(entry.last_error.unwrap().contains("store offline"));
    assert!(entry.first_failed_at.is_some());
}

#[tokio::test]
async fn conflict_is_rejected_without_retry() {
    let conflict = HandlerError::Conflict {
        account_id: "A1".into(),
        vendor_id: "V1".into(),
    };
    let handler = Arc::new(FailingHandler::new("update_order", conflict.clone()));
    let dlq = DeadLetterQueue::new(10);

    let router = EventRouter::builder()
        .clock(Arc::new(test_clock()))
        .dead_letters(dlq.clone())
        .rule(
            Rule::new("update_order")
                .pattern(on_event_type("update_order"))
                .target(target(handler.clone(), 3)),
        )
        .build()
        .unwrap();

    for _ in 0..2 {
        let report = router
            .route(helpers::update_order("A1", "V1", "2021-01-02", json!("y")))
            .await;
        assert_eq!(
            report.dispatches[0].outcome,
            DispatchOutcome::Rejected {
                error: conflict.clone()
            }
        );
        assert_eq!(report.dispatches[0].attempts, 1);
    }

    assert_eq!(handler.attempts(), 2);
    let entries = dlq.snapshot();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.reason == DeadLetterReason::Rejected));
}

#[tokio::test]
async fn transient_failure_recovers_within_budget() {
    let flaky = Arc::new(FlakyHandler::new("put_order", 2));
    let dlq = DeadLetterQueue::new(10);

    let router = EventRouter::builder()
        .clock(Arc::new(test_clock()))
        .dead_letters(dlq.clone())
        .rule(
            Rule::new("new_order")
                .pattern(on_event_type("new_order"))
                .target(target(flaky.clone(), 3)),
        )
        .build()
        .unwrap();

    let report = router
        .route(helpers::new_order("A1", "V1", "2021-01-01", json!("x")))
        .await;

    assert_eq!(report.dispatches[0].outcome, DispatchOutcome::Delivered);
    assert_eq!(report.dispatches[0].attempts, 3);
    assert!(dlq.is_empty());
}

#[tokio::test]
async fn stale_envelope_is_abandoned_without_attempting() {
    let handler = Arc::new(RecordingHandler::new("put_order"));
    let dlq = DeadLetterQueue::new(10);
    let clock = Arc::new(ManualClock::new(test_time()));
    clock.advance(chrono::Duration::hours(3));

    let router = EventRouter::builder()
        .clock(clock)
        .dead_letters(dlq.clone())
        .rule(
            Rule::new("new_order")
                .pattern(on_event_type("new_order"))
                .target(target(handler.clone(), 2)),
        )
        .build()
        .unwrap();

    let report = router
        .route(helpers::new_order("A1", "V1", "2021-01-01", json!("x")))
        .await;

    assert_eq!(handler.calls(), 0);
    assert_eq!(report.dispatches[0].attempts, 0);
    assert_eq!(
        report.dispatches[0].outcome,
        DispatchOutcome::DeadLettered {
            reason: DeadLetterReason::EventAgeExceeded {
                age_ms: 3 * 60 * 60 * 1000
            }
        }
    );
    assert_eq!(dlq.peek().unwrap().last_error, None);
}

#[tokio::test]
async fn panicking_target_is_dead_lettered_alone() {
    let healthy = Arc::new(RecordingHandler::new("healthy"));
    let dlq = DeadLetterQueue::new(10);

    let router = EventRouter::builder()
        .clock(Arc::new(test_clock()))
        .dead_letters(dlq.clone())
        .rule(
            Rule::new("new_order")
                .pattern(on_event_type("new_order"))
                .target(target(Arc::new(PanickingHandler::new("boom")), 2))
                .target(target(healthy.clone(), 2)),
        )
        .build()
        .unwrap();

    let report = router
        .route(helpers::new_order("A1", "V1", "2021-01-01", json!("x")))
        .await;

    let boom = report.dispatch("boom").unwrap();
    assert_eq!(
        boom.outcome,
        DispatchOutcome::DeadLettered {
            reason: DeadLetterReason::TaskPanicked
        }
    );
    assert_eq!(boom.attempts, 1);
    assert_eq!(report.dispatch("healthy").unwrap().outcome, DispatchOutcome::Delivered);
    assert_eq!(dlq.peek().unwrap().reason, DeadLetterReason::TaskPanicked);
}

#[tokio::test]
async fn slow_target_does_not_delay_sibling_completion() {
    let slow = Arc::new(RecordingHandler::new("slow").with_delay(Duration::from_millis(200)));
    let fast = Arc::new(RecordingHandler::new("fast"));

    let router = EventRouter::builder()
        .clock(Arc::new(test_clock()))
        .rule(
            Rule::new("new_order")
                .pattern(on_event_type("new_order"))
                .target(target(slow.clone(), 1))
                .target(target(fast.clone(), 1)),
        )
        .build()
        .unwrap();

    let handle = router
        .submit(helpers::new_order("A1", "V1", "2021-01-01", json!("x")))
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while fast.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("fast target should complete while slow target sleeps");
    assert_eq!(slow.calls(), 0);

    let report = handle.await.unwrap();
    assert!(report.all_delivered());
    assert_eq!(slow.calls(), 1);
}

#[tokio::test]
async fn health_follows_dead_letter_queue() {
    let dlq = DeadLetterQueue::new(2);
    let router = EventRouter::builder()
        .clock(Arc::new(test_clock()))
        .dead_letters(dlq.clone())
        .rule(
            Rule::new("update_order")
                .pattern(on_event_type("update_order"))
                .target(target(Arc::new(FailingHandler::transient("update_order")), 1)),
        )
        .build()
        .unwrap();

    assert!(router.health().status.is_healthy());

    router
        .route(helpers::update_order("A1", "V1", "2021-01-02", json!("y")))
        .await;
    assert!(router.health().status.is_degraded());

    router
        .route(helpers::update_order("A1", "V1", "2021-01-02", json!("y")))
        .await;
    assert!(router.health().status.is_unhealthy());

    dlq.drain();
    assert!(router.health().status.is_healthy());
}

#[tokio::test]
async fn rules_can_be_loaded_from_json_patterns() {
    let handler = Arc::new(RecordingHandler::new("put_order"));
    let pattern = EventPattern::from_json(&json!({
        "detail": { "order": { "eventtype": ["new_order"] } }
    }))
    .unwrap();

    let router = EventRouter::builder()
        .clock(Arc::new(test_clock()))
        .rule(Rule::new("new_order").pattern(pattern).target(target(handler.clone(), 1)))
        .build()
        .unwrap();

    router
        .route(helpers::new_order("A1", "V1", "2021-01-01", json!("x")))
        .await;
    router
        .route(helpers::update_order("A1", "V1", "2021-01-02", json!("y")))
        .await;

    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn shutdown_waits_for_submitted_dispatch_to_finish() {
    let slow = Arc::new(RecordingHandler::new("slow").with_delay(Duration::from_millis(300)));
    let router = EventRouter::builder()
        .clock(Arc::new(test_clock()))
        .rule(
            Rule::new("new_order")
                .pattern(on_event_type("new_order"))
                .target(target(slow.clone(), 1)),
        )
        .build()
        .unwrap();

    drop(
        router
            .submit(helpers::new_order("A1", "V1", "2021-01-01", json!("x")))
            .unwrap(),
    );
    assert_eq!(router.in_flight(), 1);

    router.shutdown(Duration::from_secs(2)).await.unwrap();

    assert_eq!(slow.calls(), 1);
    assert_eq!(router.in_flight(), 0);
    assert!(router.dead_letters().is_empty());
}

#[tokio::test]
async fn shutdown_lets_backoff_finish_into_dead_letters() {
    let dlq = DeadLetterQueue::new(10);
    let backoff = RetryPolicy::builder()
        .max_attempts(2)
        .initial_delay(Duration::from_millis(150))
        .jitter(false)
        .build();
    let router = EventRouter::builder()
        .clock(Arc::new(test_clock()))
        .dead_letters(dlq.clone())
        .rule(
            Rule::new("update_order")
                .pattern(on_event_type("update_order"))
                .target(
                    Target::new(Arc::new(FailingHandler::transient("update_order")))
                        .with_retry(backoff),
                ),
        )
        .build()
        .unwrap();

    drop(
        router
            .submit(helpers::update_order("A1", "V1", "2021-01-01", json!("x")))
            .unwrap(),
    );
    router.shutdown(Duration::from_secs(2)).await.unwrap();

    let entry = dlq.peek().unwrap();
    assert_eq!(entry.reason, DeadLetterReason::RetriesExhausted);
    assert_eq!(entry.attempts, 2);
}

#[tokio::test]
async fn shutdown_reports_envelopes_still_routing_on_timeout() {
    let slow = Arc::new(RecordingHandler::new("slow").with_delay(Duration::from_secs(5)));
    let router = EventRouter::builder()
        .clock(Arc::new(test_clock()))
        .rule(
            Rule::new("new_order")
                .pattern(on_event_type("new_order"))
                .target(target(slow.clone(), 1)),
        )
        .build()
        .unwrap();

    drop(
        router
            .submit(helpers::new_order("A1", "V1", "2021-01-01", json!("x")))
            .unwrap(),
    );

    let result = router.shutdown(Duration::from_millis(50)).await;
    assert_eq!(result, Err(RouterError::ShutdownTimeout(1)));
    assert_eq!(
        router
            .submit(helpers::new_order("A2", "V2", "2021-01-01", json!("y")))
            .unwrap_err(),
        RouterError::ShutdownInProgress
    );
}
