//! Event envelope: the canonical, routable form of a business event.
//!
//! An [`Envelope`] wraps an arbitrary JSON `detail` together with the routing
//! metadata rules are evaluated against (`source`, `detail-type`, `region`).
//! Once built, an envelope is never mutated: the router shares it between
//! dispatch tasks behind an `Arc`, and every routing decision is a pure
//! function of its fields.
//!
//! # Field Addressing
//!
//! Patterns address envelope fields by name:
//!
//! | Path                     | Resolves to                           |
//! |--------------------------|---------------------------------------|
//! | `id`                     | envelope id (string)                  |
//! | `source`                 | producer identifier                   |
//! | `detail-type`            | classification (alias `detailType`)   |
//! | `region`                 | originating region tag                |
//! | `detail`                 | the whole detail document             |
//! | `detail.order.eventtype` | nested value inside the detail        |
//!
//! # Example
//!
//! ```
//! use orderbus_core::envelope::Envelope;
//! use serde_json::json;
//!
//! let envelope = Envelope::builder()
//!     .source("WebApp")
//!     .detail_type("event_sourcing_eventbridge")
//!     .region("ap-southeast-2")
//!     .detail(json!({ "order": { "eventtype": "new_order", "accountid": "A1" } }))
//!     .build();
//!
//! assert_eq!(
//!     envelope.field("detail.order.accountid").as_deref(),
//!     Some(&json!("A1"))
//! );
//! assert!(envelope.field("detail.order.missing").is_none());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use uuid::Uuid;

/// Unique identifier of an envelope, assigned when it enters the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvelopeId(Uuid);

impl EnvelopeId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EnvelopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable, routable business event.
///
/// Fields are private; use the accessors. Serialization uses the wire names of
/// the event bus wire format (`detail-type`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    id: EnvelopeId,
    source: String,
    #[serde(rename = "detail-type", alias = "detailType")]
    detail_type: String,
    time: DateTime<Utc>,
    region: String,
    detail: Value,
}

impl Envelope {
    /// Start building an envelope.
    #[must_use]
    pub fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::default()
    }

    /// Envelope identifier.
    #[must_use]
    pub const fn id(&self) -> EnvelopeId {
        self.id
    }

    /// Producer identifier.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Free-form classification.
    #[must_use]
    pub fn detail_type(&self) -> &str {
        &self.detail_type
    }

    /// When the envelope was first dispatched. Reference point for event age.
    #[must_use]
    pub const fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Originating region tag.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Business payload, verbatim.
    #[must_use]
    pub const fn detail(&self) -> &Value {
        &self.detail
    }

    /// Resolve a field path against this envelope.
    ///
    /// Top-level metadata fields are returned as owned JSON strings; paths
    /// under `detail` borrow from the payload. Returns `None` for unknown
    /// top-level names and for any missing path segment.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<Cow<'_, Value>> {
        let mut segments = path.split('.');
        let head = segments.next()?;

        let owned = |s: &str| Some(Cow::Owned(Value::String(s.to_string())));

        match head {
            "id" => owned(&self.id.to_string()),
            "source" => owned(&self.source),
            "detail-type" | "detailType" => owned(&self.detail_type),
            "region" => owned(&self.region),
            "detail" => {
                let mut current = &self.detail;
                for segment in segments {
                    current = current.get(segment)?;
                }
                Some(Cow::Borrowed(current))
            },
            _ => None,
        }
    }

    /// Age of the envelope relative to `now`, clamped at zero.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.time).to_std().unwrap_or_default()
    }
}

/// Builder for [`Envelope`].
///
/// Unset fields default to empty strings, a `null` detail, a fresh id and the
/// current time.
#[derive(Debug, Default)]
pub struct EnvelopeBuilder {
    id: Option<EnvelopeId>,
    source: String,
    detail_type: String,
    time: Option<DateTime<Utc>>,
    region: String,
    detail: Value,
}

impl EnvelopeBuilder {
    /// Use a specific id instead of a generated one.
    #[must_use]
    pub const fn id(mut self, id: EnvelopeId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the producer identifier.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the classification string.
    #[must_use]
    pub fn detail_type(mut self, detail_type: impl Into<String>) -> Self {
        self.detail_type = detail_type.into();
        self
    }

    /// Set the dispatch time.
    #[must_use]
    pub const fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Set the originating region.
    #[must_use]
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set the business payload.
    #[must_use]
    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    /// Build the envelope.
    #[must_use]
    pub fn build(self) -> Envelope {
        Envelope {
            id: self.id.unwrap_or_default(),
            source: self.source,
            detail_type: self.detail_type,
            time: self.time.unwrap_or_else(Utc::now),
            region: self.region,
            detail: self.detail,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn sample() -> Envelope {
        Envelope::builder()
            .source("WebApp")
            .detail_type("event_sourcing_eventbridge")
            .region("ap-southeast-2")
            .detail(json!({
                "order": {
                    "eventtype": "new_order",
                    "accountid": "A1",
                    "details": { "quantity": 2 }
                }
            }))
            .build()
    }

    #[test]
    fn resolves_metadata_fields() {
        let envelope = sample();
        assert_eq!(envelope.field("source").as_deref(), Some(&json!("WebApp")));
        assert_eq!(
            envelope.field("detailType").as_deref(),
            Some(&json!("event_sourcing_eventbridge"))
        );
        assert_eq!(
            envelope.field("detail-type").as_deref(),
            Some(&json!("event_sourcing_eventbridge"))
        );
        assert_eq!(
            envelope.field("region").as_deref(),
            Some(&json!("ap-southeast-2"))
        );
        assert_eq!(
            envelope.field("id").as_deref(),
            Some(&json!(envelope.id().to_string()))
        );
    }

    #[test]
    fn resolves_nested_detail_paths() {
        let envelope = sample();
        assert_eq!(
            envelope.field("detail.order.details.quantity").as_deref(),
            Some(&json!(2))
        );
        assert!(envelope.field("detail.order.vendorid").is_none());
        assert!(envelope.field("detail.order.eventtype.deeper").is_none());
        assert!(envelope.field("account").is_none());
    }

    #[test]
    fn age_is_clamped_at_zero() {
        let envelope = sample();
        let before = envelope.time() - ChronoDuration::seconds(10);
        assert_eq!(envelope.age_at(before), std::time::Duration::ZERO);

        let later = envelope.time() + ChronoDuration::seconds(90);
        assert_eq!(envelope.age_at(later), std::time::Duration::from_secs(90));
    }

    #[test]
    fn serializes_with_wire_names() {
        let envelope = sample();
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["detail-type"], json!("event_sourcing_eventbridge"));

        let back: Envelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, envelope);
    }
}
