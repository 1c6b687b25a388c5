//! Event handler seam and the handler error taxonomy.
//!
//! A handler is the unit of work a rule target runs for one envelope. The
//! router invokes it once per attempt, so every handler must be idempotent:
//! delivery is at-least-once and retries are not transactional.
//!
//! # Error Taxonomy
//!
//! | Variant          | Meaning                          | Retried |
//! |------------------|----------------------------------|---------|
//! | `Validation`     | malformed envelope               | no      |
//! | `Conflict`       | update before create             | no      |
//! | `TransientStore` | store temporarily unavailable    | yes     |
//!
//! Exhausting the retry budget is not an error variant: the router reports it
//! as a dead-lettered dispatch.
//!
//! # Dyn Compatibility
//!
//! [`EventHandler`] returns `Pin<Box<dyn Future>>` instead of `impl Future` so
//! rules can hold heterogeneous targets as `Arc<dyn EventHandler>`.

use crate::envelope::Envelope;
use crate::projection::StoreError;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Failure reported by a handler for one attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The envelope is malformed (missing or mistyped required fields).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// An update arrived for an order that does not exist yet.
    #[error("Order ({account_id}, {vendor_id}) does not exist")]
    Conflict {
        /// Account part of the key
        account_id: String,
        /// Vendor part of the key
        vendor_id: String,
    },

    /// The projection store could not be reached; worth retrying.
    #[error("Store temporarily unavailable: {0}")]
    TransientStore(String),
}

impl HandlerError {
    /// Whether the router should attempt the dispatch again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }

    /// Short machine-readable kind, used in logs, metrics and reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict { .. } => "conflict",
            Self::TransientStore(_) => "transient_store",
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        Self::TransientStore(err.to_string())
    }
}

/// Future returned by [`EventHandler::handle`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;

/// A rule target.
///
/// # Example
///
/// ```
/// use orderbus_core::envelope::Envelope;
/// use orderbus_core::handler::{EventHandler, HandlerFuture};
///
/// struct Noop;
///
/// impl EventHandler for Noop {
///     fn name(&self) -> &str {
///         "noop"
///     }
///
///     fn handle<'a>(&'a self, _envelope: &'a Envelope) -> HandlerFuture<'a> {
///         Box::pin(async { Ok(()) })
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Stable handler name, used as the default target name.
    fn name(&self) -> &str;

    /// Process one delivery of `envelope`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`]; only [`HandlerError::TransientStore`] is
    /// retried by the router.
    fn handle<'a>(&'a self, envelope: &'a Envelope) -> HandlerFuture<'a>;
}
