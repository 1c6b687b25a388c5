//! Audit sink that writes every envelope to the `audit` tracing target.
//!
//! Filter it separately from application logs, e.g.
//! `RUST_LOG=info,audit=info` or ship the `audit` target to its own layer.

use orderbus_core::audit::AuditSink;
use orderbus_core::envelope::Envelope;

/// Logs each envelope as one structured event with the full envelope as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn append(&self, envelope: &Envelope) {
        match serde_json::to_string(envelope) {
            Ok(json) => tracing::info!(
                target: "audit",
                envelope_id = %envelope.id(),
                source = envelope.source(),
                region = envelope.region(),
                envelope = %json,
                "Envelope received"
            ),
            Err(error) => tracing::warn!(
                target: "audit",
                envelope_id = %envelope.id(),
                error = %error,
                "Envelope could not be serialized for audit"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderbus_testing::helpers;
    use serde_json::json;

    #[test]
    fn append_never_panics() {
        orderbus_testing::init_tracing();
        TracingAuditSink.append(&helpers::new_order("A1", "V1", "2021-01-01", json!("x")));
    }
}
