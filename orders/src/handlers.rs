//! Business handlers that fold order events into the projection store.
//!
//! Both handlers read the order from `detail.order`:
//!
//! ```json
//! {
//!   "order": {
//!     "eventtype": "new_order",
//!     "accountid": "A1",
//!     "vendorid": "V1",
//!     "orderdate": "2021-01-01",
//!     "city": "Sydney",
//!     "details": { "coffeetype": "latte", "quantity": 2 }
//!   }
//! }
//! ```
//!
//! Delivery is at-least-once and out of order, so both are idempotent: a
//! repeated create keeps the first record, a repeated update rewrites the
//! same values.

use orderbus_core::envelope::Envelope;
use orderbus_core::handler::{EventHandler, HandlerError, HandlerFuture};
use orderbus_core::projection::{OrderKey, OrderMutation, OrderRecord, OrderStore};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Order fields extracted from an envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    /// Account part of the key
    pub account_id: String,
    /// Vendor part of the key
    pub vendor_id: String,
    /// Order date
    pub order_date: String,
    /// Opaque payload, `null` when absent
    pub details: Value,
    /// Optional city
    pub city: Option<String>,
}

impl OrderEvent {
    /// Parse `detail.order` from `envelope`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Validation`] if `detail.order` is missing or
    /// not an object, if `accountid` or `vendorid` is missing, blank or not a
    /// string, or if `orderdate` is missing or not a string.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, HandlerError> {
        let order = envelope
            .detail()
            .get("order")
            .and_then(Value::as_object)
            .ok_or_else(|| HandlerError::Validation("detail.order is missing".to_string()))?;

        let account_id = key_field(order, "accountid")?;
        let vendor_id = key_field(order, "vendorid")?;
        let order_date = match order.get("orderdate") {
            Some(Value::String(date)) => date.clone(),
            Some(_) => return Err(HandlerError::Validation("orderdate must be a string".to_string())),
            None => return Err(HandlerError::Validation("orderdate is missing".to_string())),
        };
        let city = match order.get("city") {
            None | Some(Value::Null) => None,
            Some(Value::String(city)) => Some(city.clone()),
            Some(_) => return Err(HandlerError::Validation("city must be a string".to_string())),
        };

        Ok(Self {
            account_id,
            vendor_id,
            order_date,
            details: order.get("details").cloned().unwrap_or(Value::Null),
            city,
        })
    }

    /// Primary key of the order.
    #[must_use]
    pub fn key(&self) -> OrderKey {
        OrderKey::new(self.account_id.clone(), self.vendor_id.clone())
    }

    fn into_record(self) -> OrderRecord {
        OrderRecord {
            account_id: self.account_id,
            vendor_id: self.vendor_id,
            order_date: self.order_date,
            details: self.details,
            city: self.city,
        }
    }

    fn mutation(&self) -> OrderMutation {
        OrderMutation {
            order_date: self.order_date.clone(),
            details: self.details.clone(),
        }
    }
}

fn key_field(order: &Map<String, Value>, name: &str) -> Result<String, HandlerError> {
    match order.get(name) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.clone()),
        Some(Value::String(_)) => Err(HandlerError::Validation(format!("{name} is blank"))),
        Some(_) => Err(HandlerError::Validation(format!("{name} must be a string"))),
        None => Err(HandlerError::Validation(format!("{name} is missing"))),
    }
}

/// Creates the order record on `new_order`. First write wins.
#[derive(Clone)]
pub struct PutOrderHandler {
    store: Arc<dyn OrderStore>,
}

impl PutOrderHandler {
    /// Create a handler writing to `store`.
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    async fn put(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        let event = OrderEvent::from_envelope(envelope)?;
        let key = event.key();

        let created = self.store.put_if_absent(event.into_record()).await?;
        if created {
            tracing::info!(order = %key, "Order created");
        } else {
            tracing::debug!(order = %key, "Order already exists, keeping first write");
        }
        Ok(())
    }
}

impl EventHandler for PutOrderHandler {
    fn name(&self) -> &str {
        "put_order"
    }

    fn handle<'a>(&'a self, envelope: &'a Envelope) -> HandlerFuture<'a> {
        Box::pin(self.put(envelope))
    }
}

/// Replaces `orderdate` and `details` on `update_order`. Never creates.
#[derive(Clone)]
pub struct UpdateOrderHandler {
    store: Arc<dyn OrderStore>,
}

impl UpdateOrderHandler {
    /// Create a handler writing to `store`.
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    async fn update(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        let event = OrderEvent::from_envelope(envelope)?;
        let key = event.key();

        if self.store.update(&key, event.mutation()).await? {
            tracing::info!(order = %key, order_date = %event.order_date, "Order updated");
            Ok(())
        } else {
            tracing::warn!(order = %key, "Update for unknown order");
            Err(HandlerError::Conflict {
                account_id: key.account_id,
                vendor_id: key.vendor_id,
            })
        }
    }
}

impl EventHandler for UpdateOrderHandler {
    fn name(&self) -> &str {
        "update_order"
    }

    fn handle<'a>(&'a self, envelope: &'a Envelope) -> HandlerFuture<'a> {
        Box::pin(self.update(envelope))
    }
}
