//! Order projection: the materialized current state of each order.
//!
//! # Overview
//!
//! Projections are the **query side** of the system. Events flow through the
//! router; handlers fold them into an [`OrderStore`] which keeps one
//! [`OrderRecord`] per `(accountid, vendorid)` key plus two read-side indexes.
//!
//! ```text
//! Write path:                         Read paths:
//! ┌──────────────┐                    ┌──────────────────────────────────┐
//! │ Put / Update │ ──▶ primary record │ get(accountid, vendorid)         │
//! │   handlers   │     (accountid,    │ by_account(accountid)  ⇢ orderdate│
//! └──────────────┘      vendorid)     │ by_vendor(vendorid)    ⇢ orderdate│
//!                                     └──────────────────────────────────┘
//! ```
//!
//! ## Index Projections
//!
//! - **by account**, ordered by `orderdate`: projects `vendorid`, `details`
//! - **by vendor**, ordered by `orderdate`: projects `vendorid`, `accountid`,
//!   `details`
//!
//! Both indexes are derived from the primary record and must be consistent
//! with it after every write. Ties on `orderdate` are broken by the other key
//! attribute.
//!
//! ## Concurrency Contract
//!
//! Implementations must allow concurrent writes to different keys without
//! coordination and must serialize (or conditionally apply) writes to the same
//! key: Put and Update handlers race for the same key under at-least-once,
//! out-of-order delivery.
//!
//! # Dyn Compatibility
//!
//! [`OrderStore`] uses explicit `Pin<Box<dyn Future>>` returns so handlers can
//! hold it as `Arc<dyn OrderStore>`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Error type for projection store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unreachable, timed out, or refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Boxed future returned by [`OrderStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Composite primary key of an order. Both parts are immutable once set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderKey {
    /// Account placing the order
    #[serde(rename = "accountid")]
    pub account_id: String,
    /// Vendor fulfilling the order
    #[serde(rename = "vendorid")]
    pub vendor_id: String,
}

impl OrderKey {
    /// Creates a new key.
    #[must_use]
    pub fn new(account_id: impl Into<String>, vendor_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            vendor_id: vendor_id.into(),
        }
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.account_id, self.vendor_id)
    }
}

/// Materialized state of one order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Account part of the key
    #[serde(rename = "accountid")]
    pub account_id: String,
    /// Vendor part of the key
    #[serde(rename = "vendorid")]
    pub vendor_id: String,
    /// Sortable order date
    #[serde(rename = "orderdate")]
    pub order_date: String,
    /// Opaque order payload
    pub details: Value,
    /// City the order was placed from, if the producer sent one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl OrderRecord {
    /// Primary key of this record.
    #[must_use]
    pub fn key(&self) -> OrderKey {
        OrderKey::new(self.account_id.clone(), self.vendor_id.clone())
    }

    /// Row as seen through the account index.
    #[must_use]
    pub fn account_view(&self) -> AccountOrderView {
        AccountOrderView {
            account_id: self.account_id.clone(),
            order_date: self.order_date.clone(),
            vendor_id: self.vendor_id.clone(),
            details: self.details.clone(),
        }
    }

    /// Row as seen through the vendor index.
    #[must_use]
    pub fn vendor_view(&self) -> VendorOrderView {
        VendorOrderView {
            vendor_id: self.vendor_id.clone(),
            order_date: self.order_date.clone(),
            account_id: self.account_id.clone(),
            details: self.details.clone(),
        }
    }
}

/// Full replacement of an order's mutable fields.
///
/// There is no partial merge and no version check: applying the same mutation
/// twice yields the same record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderMutation {
    /// New order date
    #[serde(rename = "orderdate")]
    pub order_date: String,
    /// New payload
    pub details: Value,
}

impl OrderMutation {
    /// Apply to a record in place. Key fields are never touched.
    pub fn apply(&self, record: &mut OrderRecord) {
        record.order_date.clone_from(&self.order_date);
        record.details = self.details.clone();
    }
}

/// Account index row: `accountid` + `orderdate` keys, projecting
/// `vendorid` and `details`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountOrderView {
    /// Index partition
    #[serde(rename = "accountid")]
    pub account_id: String,
    /// Index sort key
    #[serde(rename = "orderdate")]
    pub order_date: String,
    /// Projected attribute
    #[serde(rename = "vendorid")]
    pub vendor_id: String,
    /// Projected attribute
    pub details: Value,
}

/// Vendor index row: `vendorid` + `orderdate` keys, projecting
/// `accountid` and `details`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VendorOrderView {
    /// Index partition
    #[serde(rename = "vendorid")]
    pub vendor_id: String,
    /// Index sort key
    #[serde(rename = "orderdate")]
    pub order_date: String,
    /// Projected attribute
    #[serde(rename = "accountid")]
    pub account_id: String,
    /// Projected attribute
    pub details: Value,
}

/// Storage backend for the order projection.
///
/// # Example
///
/// ```ignore
/// let created = store.put_if_absent(record).await?;
/// let updated = store.update(&key, mutation).await?;
/// let history = store.by_account("A1").await?;
/// ```
pub trait OrderStore: Send + Sync {
    /// Fetch the record for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read.
    fn get<'a>(&'a self, key: &'a OrderKey) -> StoreFuture<'a, Option<OrderRecord>>;

    /// Insert `record` unless its key already exists.
    ///
    /// Returns `true` if the record was created, `false` if a record with the
    /// same key was already present (left untouched).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write cannot be performed.
    fn put_if_absent(&self, record: OrderRecord) -> StoreFuture<'_, bool>;

    /// Apply `mutation` to the record for `key`.
    ///
    /// Returns `false` (and creates nothing) if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write cannot be performed.
    fn update<'a>(&'a self, key: &'a OrderKey, mutation: OrderMutation) -> StoreFuture<'a, bool>;

    /// All orders of an account, ascending by `orderdate`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the index cannot be read.
    fn by_account<'a>(&'a self, account_id: &'a str) -> StoreFuture<'a, Vec<AccountOrderView>>;

    /// All orders of a vendor, ascending by `orderdate`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the index cannot be read.
    fn by_vendor<'a>(&'a self, vendor_id: &'a str) -> StoreFuture<'a, Vec<VendorOrderView>>;
}
