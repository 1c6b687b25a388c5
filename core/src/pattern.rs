//! Declarative event patterns.
//!
//! Rules are data, not code. An [`EventPattern`] is a list of field matchers;
//! each matcher names a field path (see [`Envelope::field`]) and the set of
//! values it accepts. A pattern matches an envelope iff **every** matcher is
//! satisfied:
//!
//! - the field must be present (a missing field never matches)
//! - a scalar field matches when it equals one of the accepted values
//! - an array field matches when any of its elements is accepted
//!
//! An empty pattern matches every envelope.
//!
//! # Nested JSON Form
//!
//! Patterns can also be written in the nested form used by event bus rule
//! definitions, where leaves are arrays of accepted values:
//!
//! ```
//! use orderbus_core::pattern::EventPattern;
//! use serde_json::json;
//!
//! let pattern = EventPattern::from_json(&json!({
//!     "detail": { "order": { "eventtype": ["new_order"] } }
//! }))
//! .unwrap();
//!
//! assert_eq!(pattern, EventPattern::new().field("detail.order.eventtype", ["new_order"]));
//! ```

use crate::envelope::Envelope;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while parsing a pattern from its JSON form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern root (or a nested level) was not a JSON object.
    #[error("Pattern at '{path}' must be an object")]
    NotAnObject {
        /// Path of the offending level (empty for the root)
        path: String,
    },

    /// A leaf list was empty and could never match.
    #[error("Pattern field '{0}' has no accepted values")]
    EmptyValues(String),

    /// A leaf list contained an object or array.
    #[error("Pattern field '{0}' accepts only scalar values")]
    NonScalarValue(String),
}

/// A single field predicate: `path ∈ accepted`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldMatcher {
    path: String,
    accepted: Vec<Value>,
}

impl FieldMatcher {
    /// Field path this matcher inspects.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Values accepted for the field.
    #[must_use]
    pub fn accepted(&self) -> &[Value] {
        &self.accepted
    }

    fn accepts(&self, value: &Value) -> bool {
        match value {
            Value::Array(items) => items.iter().any(|item| self.accepted.contains(item)),
            scalar => self.accepted.contains(scalar),
        }
    }
}

/// Conjunction of field matchers evaluated against an [`Envelope`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPattern {
    fields: Vec<FieldMatcher>,
}

impl EventPattern {
    /// An empty pattern (matches everything).
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Add a field predicate.
    ///
    /// # Example
    ///
    /// ```
    /// use orderbus_core::pattern::EventPattern;
    ///
    /// let audit = EventPattern::new().field("region", ["ap-southeast-2"]);
    /// assert_eq!(audit.fields().len(), 1);
    /// ```
    #[must_use]
    pub fn field<I, V>(mut self, path: impl Into<String>, accepted: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.fields.push(FieldMatcher {
            path: path.into(),
            accepted: accepted.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Parse the nested JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if a level is not an object, a leaf list is
    /// empty, or a leaf list contains non-scalar values.
    pub fn from_json(value: &Value) -> Result<Self, PatternError> {
        let mut pattern = Self::new();
        collect_fields(value, String::new(), &mut pattern.fields)?;
        Ok(pattern)
    }

    /// Field matchers making up this pattern.
    #[must_use]
    pub fn fields(&self) -> &[FieldMatcher] {
        &self.fields
    }

    /// Evaluate the pattern. Pure function of the envelope's fields.
    #[must_use]
    pub fn matches(&self, envelope: &Envelope) -> bool {
        self.fields.iter().all(|matcher| {
            envelope
                .field(&matcher.path)
                .is_some_and(|value| matcher.accepts(&value))
        })
    }
}

fn collect_fields(
    value: &Value,
    prefix: String,
    out: &mut Vec<FieldMatcher>,
) -> Result<(), PatternError> {
    let Value::Object(map) = value else {
        return Err(PatternError::NotAnObject { path: prefix });
    };

    for (key, child) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match child {
            Value::Array(values) => {
                if values.is_empty() {
                    return Err(PatternError::EmptyValues(path));
                }
                if values.iter().any(|v| v.is_object() || v.is_array()) {
                    return Err(PatternError::NonScalarValue(path));
                }
                out.push(FieldMatcher {
                    path,
                    accepted: values.clone(),
                });
            },
            Value::Object(_) => collect_fields(child, path, out)?,
            _ => return Err(PatternError::NotAnObject { path }),
        }
    }
    Ok(())
}
