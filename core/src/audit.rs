//! Audit sink seam.
//!
//! The audit logger records every envelope routed to it verbatim. It is
//! append-only and best-effort: `append` cannot fail and must not block the
//! caller for long. Implementations that talk to slow backends should buffer
//! or spawn internally.

use crate::envelope::Envelope;

/// Append-only, fire-and-forget envelope sink.
pub trait AuditSink: Send + Sync {
    /// Record `envelope`. Never fails from the caller's point of view.
    fn append(&self, envelope: &Envelope);
}
