//! Routing rules: a pattern plus the targets it fans out to.

use crate::retry::RetryPolicy;
use orderbus_core::envelope::Envelope;
use orderbus_core::handler::EventHandler;
use orderbus_core::pattern::EventPattern;
use std::fmt;
use std::sync::Arc;

/// A named handler bound to a rule, with its own retry policy.
#[derive(Clone)]
pub struct Target {
    name: String,
    handler: Arc<dyn EventHandler>,
    retry: RetryPolicy,
}

impl Target {
    /// Wrap `handler`, named after [`EventHandler::name`], with the default policy.
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            name: handler.name().to_string(),
            handler,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the target name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Target name, as used in reports and dead letters.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The handler invoked on every attempt.
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn EventHandler> {
        &self.handler
    }

    /// The retry policy for this target.
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Declarative routing rule.
///
/// # Example
///
/// ```ignore
/// let rule = Rule::new("new_order")
///     .description("Create an order record")
///     .pattern(EventPattern::new().field("detail.order.eventtype", ["new_order"]))
///     .target(Target::new(Arc::new(put_handler)));
/// ```
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    description: Option<String>,
    pattern: EventPattern,
    targets: Vec<Target>,
}

impl Rule {
    /// Create a rule with an empty pattern (matches everything) and no targets.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            pattern: EventPattern::new(),
            targets: Vec::new(),
        }
    }

    /// Set a human-readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the pattern.
    #[must_use]
    pub fn pattern(mut self, pattern: EventPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Append a target.
    #[must_use]
    pub fn target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    /// Rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rule description, if any.
    #[must_use]
    pub fn describe(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The rule's pattern.
    #[must_use]
    pub const fn event_pattern(&self) -> &EventPattern {
        &self.pattern
    }

    /// Targets in declaration order.
    #[must_use]
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Whether `envelope` satisfies this rule's pattern.
    #[must_use]
    pub fn matches(&self, envelope: &Envelope) -> bool {
        self.pattern.matches(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderbus_core::handler::HandlerFuture;
    use serde_json::json;

    struct Noop;

    impl EventHandler for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn handle<'a>(&'a self, _envelope: &'a Envelope) -> HandlerFuture<'a> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn target_defaults_to_handler_name() {
        let target = Target::new(Arc::new(Noop));
        assert_eq!(target.name(), "noop");
        assert_eq!(target.named("other").name(), "other");
    }

    #[test]
    fn rule_matches_via_pattern() {
        let rule = Rule::new("new_order")
            .description("create")
            .pattern(EventPattern::new().field("detail.order.eventtype", ["new_order"]))
            .target(Target::new(Arc::new(Noop)));

        let hit = Envelope::builder()
            .detail(json!({ "order": { "eventtype": "new_order" } }))
            .build();
        let miss = Envelope::builder()
            .detail(json!({ "order": { "eventtype": "update_order" } }))
            .build();

        assert!(rule.matches(&hit));
        assert!(!rule.matches(&miss));
        assert_eq!(rule.targets().len(), 1);
        assert_eq!(rule.describe(), Some("create"));
    }
}
