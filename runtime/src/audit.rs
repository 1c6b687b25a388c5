//! Audit target: adapts an [`AuditSink`] into a rule target.

use orderbus_core::audit::AuditSink;
use orderbus_core::envelope::Envelope;
use orderbus_core::handler::{EventHandler, HandlerFuture};
use std::sync::Arc;

/// Rule target that appends every envelope to an audit sink.
///
/// Always succeeds, so audit never produces retries or dead letters and is
/// unaffected by business outcomes of sibling targets.
#[derive(Clone)]
pub struct AuditTarget {
    sink: Arc<dyn AuditSink>,
}

impl AuditTarget {
    /// Wrap `sink`.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }
}

impl EventHandler for AuditTarget {
    fn name(&self) -> &str {
        "audit"
    }

    fn handle<'a>(&'a self, envelope: &'a Envelope) -> HandlerFuture<'a> {
        self.sink.append(envelope);
        Box::pin(async { Ok(()) })
    }
}
