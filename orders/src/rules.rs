//! The service's routing table.
//!
//! | Rule           | Pattern                                    | Target         |
//! |----------------|--------------------------------------------|----------------|
//! | `new_order`    | `detail.order.eventtype = new_order`       | `put_order`    |
//! | `update_order` | `detail.order.eventtype = update_order`    | `update_order` |
//! | `audit`        | `region = <audit region>`                  | `audit`        |
//!
//! Patterns are written in their JSON form so the table reads the same as a
//! rule definition shipped as configuration.

use crate::config::Config;
use crate::handlers::{PutOrderHandler, UpdateOrderHandler};
use orderbus_core::audit::AuditSink;
use orderbus_core::pattern::{EventPattern, PatternError};
use orderbus_core::projection::OrderStore;
use orderbus_runtime::{AuditTarget, RetryPolicy, Rule, Target};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Build the three rules of the order service.
///
/// Business targets share the retry policy from `config`. The audit target
/// records every envelope however old it is, so its policy has no age limit.
///
/// # Errors
///
/// Returns [`PatternError`] if a pattern does not parse.
pub fn order_rules(
    config: &Config,
    store: &Arc<dyn OrderStore>,
    audit: Arc<dyn AuditSink>,
) -> Result<Vec<Rule>, PatternError> {
    let retry = config.retry_policy();

    let new_order = Rule::new("new_order")
        .description("Create the order projection on new_order events")
        .pattern(EventPattern::from_json(&json!({
            "detail": { "order": { "eventtype": ["new_order"] } }
        }))?)
        .target(
            Target::new(Arc::new(PutOrderHandler::new(Arc::clone(store))))
                .with_retry(retry.clone()),
        );

    let update_order = Rule::new("update_order")
        .description("Apply update_order events to the existing projection")
        .pattern(EventPattern::from_json(&json!({
            "detail": { "order": { "eventtype": ["update_order"] } }
        }))?)
        .target(
            Target::new(Arc::new(UpdateOrderHandler::new(Arc::clone(store)))).with_retry(retry),
        );

    let audit = Rule::new("audit")
        .description("Record every envelope seen in the audit region")
        .pattern(EventPattern::from_json(&json!({
            "region": [config.events.audit_region]
        }))?)
        .target(
            Target::new(Arc::new(AuditTarget::new(audit)))
                .with_retry(RetryPolicy::builder().max_event_age(Duration::MAX).build()),
        );

    Ok(vec![new_order, update_order, audit])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use orderbus_projections::InMemoryOrderStore;
    use orderbus_testing::{helpers, RecordingAuditSink};

    fn rules(config: &Config) -> Vec<Rule> {
        let store: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
        order_rules(config, &store, Arc::new(RecordingAuditSink::new())).unwrap()
    }

    fn matching(rules: &[Rule], envelope: &orderbus_core::envelope::Envelope) -> Vec<String> {
        rules
            .iter()
            .filter(|rule| rule.matches(envelope))
            .map(|rule| rule.name().to_string())
            .collect()
    }

    #[test]
    fn new_order_matches_put_and_audit() {
        let rules = rules(&Config::default());
        let envelope = helpers::new_order("A1", "V1", "2021-01-01", serde_json::json!("x"));
        assert_eq!(matching(&rules, &envelope), ["new_order", "audit"]);
    }

    #[test]
    fn unknown_event_type_only_audited() {
        let rules = rules(&Config::default());
        let envelope = helpers::envelope(helpers::order_detail(
            "cancel_order",
            "A1",
            "V1",
            "2021-01-01",
            serde_json::Value::Null,
        ));
        assert_eq!(matching(&rules, &envelope), ["audit"]);
    }

    #[test]
    fn audit_region_is_configurable() {
        let mut config = Config::default();
        config.events.audit_region = "us-east-1".to_string();
        let rules = rules(&config);
        let envelope = helpers::update_order("A1", "V1", "2021-01-01", serde_json::json!("x"));
        assert_eq!(matching(&rules, &envelope), ["update_order"]);
    }

    #[test]
    fn business_targets_use_configured_retry() {
        let mut config = Config::default();
        config.retry.max_attempts = 2;
        let rules = rules(&config);
        assert_eq!(rules[0].targets()[0].retry().max_attempts(), 2);
        assert_eq!(rules[1].targets()[0].retry().max_attempts(), 2);
        assert_eq!(rules[0].targets()[0].name(), "put_order");
        assert_eq!(rules[2].targets()[0].name(), "audit");
    }

    #[test]
    fn audit_target_ignores_event_age() {
        let mut config = Config::default();
        config.retry.max_event_age_secs = 60;
        let rules = rules(&config);
        let audit = rules[2].targets()[0].retry();
        assert_eq!(audit.max_event_age(), Duration::MAX);
        assert!(!audit.is_expired(Duration::from_secs(365 * 24 * 3600)));
        assert_eq!(
            rules[0].targets()[0].retry().max_event_age(),
            Duration::from_secs(60)
        );
    }
}
