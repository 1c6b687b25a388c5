//! In-memory order store backed by `DashMap`.
//!
//! # Locking
//!
//! ```text
//! records     DashMap<OrderKey, OrderRecord>            (primary)
//! by_account  DashMap<accountid, {(orderdate, vendorid)}>
//! by_vendor   DashMap<vendorid,  {(orderdate, accountid)}>
//! ```
//!
//! Writers hold the primary entry guard for their key while they update the
//! index sets, so writes to the same key are serialized and the indexes move
//! with the record. Lock order is always primary, then index. Readers copy an
//! index set out before touching the primary map and never hold two guards.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use orderbus_core::projection::{
    AccountOrderView, OrderKey, OrderMutation, OrderRecord, OrderStore, Result, StoreFuture,
    VendorOrderView,
};
use orderbus_runtime::metrics::StoreMetrics;
use std::collections::BTreeSet;
use std::time::Instant;

type IndexSet = BTreeSet<(String, String)>;

/// Concurrent in-memory [`OrderStore`].
///
/// # Example
///
/// ```
/// use orderbus_core::projection::{OrderRecord, OrderStore};
/// use orderbus_projections::InMemoryOrderStore;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryOrderStore::new();
/// let created = store
///     .put_if_absent(OrderRecord {
///         account_id: "A1".into(),
///         vendor_id: "V1".into(),
///         order_date: "2021-01-01".into(),
///         details: json!({ "coffeetype": "latte" }),
///         city: None,
///     })
///     .await?;
/// assert!(created);
/// assert_eq!(store.by_account("A1").await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    records: DashMap<OrderKey, OrderRecord>,
    by_account: DashMap<String, IndexSet>,
    by_vendor: DashMap<String, IndexSet>,
}

impl InMemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn index_insert(&self, record: &OrderRecord) {
        self.by_account
            .entry(record.account_id.clone())
            .or_default()
            .insert((record.order_date.clone(), record.vendor_id.clone()));
        self.by_vendor
            .entry(record.vendor_id.clone())
            .or_default()
            .insert((record.order_date.clone(), record.account_id.clone()));
    }

    fn index_remove(&self, record: &OrderRecord) {
        if let Some(mut set) = self.by_account.get_mut(&record.account_id) {
            set.remove(&(record.order_date.clone(), record.vendor_id.clone()));
        }
        if let Some(mut set) = self.by_vendor.get_mut(&record.vendor_id) {
            set.remove(&(record.order_date.clone(), record.account_id.clone()));
        }
    }

    fn put_sync(&self, record: OrderRecord) -> bool {
        match self.records.entry(record.key()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                self.index_insert(&record);
                slot.insert(record);
                true
            }
        }
    }

    fn update_sync(&self, key: &OrderKey, mutation: &OrderMutation) -> bool {
        let Some(mut record) = self.records.get_mut(key) else {
            return false;
        };

        if record.order_date != mutation.order_date {
            // Insert before remove so index readers never see the order vanish.
            let old = record.clone();
            mutation.apply(&mut record);
            self.index_insert(&record);
            self.index_remove(&old);
        } else {
            mutation.apply(&mut record);
        }
        true
    }

    fn index_rows<V>(
        &self,
        index: &DashMap<String, IndexSet>,
        partition: &str,
        key_of: impl Fn(&str) -> OrderKey,
        view_of: impl Fn(&OrderRecord) -> V,
    ) -> Vec<(String, String, V)> {
        let entries: Vec<(String, String)> = index
            .get(partition)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut rows: Vec<(String, String, V)> = entries
            .into_iter()
            .filter_map(|(_, other)| {
                let record = self.records.get(&key_of(&other))?;
                Some((record.order_date.clone(), other, view_of(record.value())))
            })
            .collect();

        // A concurrent update may have moved a row since the index was copied.
        rows.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        rows.dedup_by(|a, b| a.1 == b.1);
        rows
    }
}

impl OrderStore for InMemoryOrderStore {
    fn get<'a>(&'a self, key: &'a OrderKey) -> StoreFuture<'a, Option<OrderRecord>> {
        let started = Instant::now();
        let record = self.records.get(key).map(|r| r.value().clone());
        StoreMetrics::record_operation("get", true, started.elapsed());
        Box::pin(std::future::ready(Ok(record)))
    }

    fn put_if_absent(&self, record: OrderRecord) -> StoreFuture<'_, bool> {
        let started = Instant::now();
        let key = record.key();
        let created = self.put_sync(record);
        StoreMetrics::record_operation("put_if_absent", true, started.elapsed());
        tracing::debug!(%key, created, "put_if_absent");
        Box::pin(std::future::ready(Ok(created)))
    }

    fn update<'a>(&'a self, key: &'a OrderKey, mutation: OrderMutation) -> StoreFuture<'a, bool> {
        let started = Instant::now();
        let updated = self.update_sync(key, &mutation);
        StoreMetrics::record_operation("update", true, started.elapsed());
        tracing::debug!(%key, updated, "update");
        Box::pin(std::future::ready(Ok(updated)))
    }

    fn by_account<'a>(&'a self, account_id: &'a str) -> StoreFuture<'a, Vec<AccountOrderView>> {
        let started = Instant::now();
        let rows = self.index_rows(
            &self.by_account,
            account_id,
            |vendor_id| OrderKey::new(account_id, vendor_id),
            OrderRecord::account_view,
        );
        StoreMetrics::record_operation("by_account", true, started.elapsed());
        let views: Result<Vec<_>> = Ok(rows.into_iter().map(|(_, _, v)| v).collect());
        Box::pin(std::future::ready(views))
    }

    fn by_vendor<'a>(&'a self, vendor_id: &'a str) -> StoreFuture<'a, Vec<VendorOrderView>> {
        let started = Instant::now();
        let rows = self.index_rows(
            &self.by_vendor,
            vendor_id,
            |account_id| OrderKey::new(account_id, vendor_id),
            OrderRecord::vendor_view,
        );
        StoreMetrics::record_operation("by_vendor", true, started.elapsed());
        let views: Result<Vec<_>> = Ok(rows.into_iter().map(|(_, _, v)| v).collect());
        Box::pin(std::future::ready(views))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(account: &str, vendor: &str, date: &str, details: serde_json::Value) -> OrderRecord {
        OrderRecord {
            account_id: account.into(),
            vendor_id: vendor.into(),
            order_date: date.into(),
            details,
            city: None,
        }
    }

    #[tokio::test]
    async fn first_write_wins() {
        let store = InMemoryOrderStore::new();
        assert!(store.put_if_absent(record("A1", "V1", "2021-01-01", json!("x"))).await.unwrap());
        assert!(!store.put_if_absent(record("A1", "V1", "2021-06-01", json!("z"))).await.unwrap());

        let stored = store.get(&OrderKey::new("A1", "V1")).await.unwrap().unwrap();
        assert_eq!(stored.details, json!("x"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.by_account("A1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_of_absent_key_creates_nothing() {
        let store = InMemoryOrderStore::new();
        let key = OrderKey::new("A1", "V1");
        let mutation = OrderMutation {
            order_date: "2021-01-02".into(),
            details: json!("y"),
        };

        assert!(!store.update(&key, mutation).await.unwrap());
        assert!(store.is_empty());
        assert!(store.by_vendor("V1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_moves_row_in_both_indexes() {
        let store = InMemoryOrderStore::new();
        store.put_if_absent(record("A1", "V1", "2021-01-05", json!(1))).await.unwrap();
        store.put_if_absent(record("A1", "V2", "2021-01-03", json!(2))).await.unwrap();

        let before: Vec<_> = store
            .by_account("A1")
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.vendor_id)
            .collect();
        assert_eq!(before, vec!["V2", "V1"]);

        let mutation = OrderMutation {
            order_date: "2021-01-01".into(),
            details: json!(3),
        };
        assert!(store.update(&OrderKey::new("A1", "V1"), mutation).await.unwrap());

        let after = store.by_account("A1").await.unwrap();
        assert_eq!(after[0].vendor_id, "V1");
        assert_eq!(after[0].order_date, "2021-01-01");
        assert_eq!(after[0].details, json!(3));
        assert_eq!(after.len(), 2);

        let vendor = store.by_vendor("V1").await.unwrap();
        assert_eq!(vendor.len(), 1);
        assert_eq!(vendor[0].order_date, "2021-01-01");
    }

    #[tokio::test]
    async fn ties_break_on_other_key() {
        let store = InMemoryOrderStore::new();
        for account in ["A3", "A1", "A2"] {
            store
                .put_if_absent(record(account, "V1", "2021-01-01", json!(null)))
                .await
                .unwrap();
        }

        let accounts: Vec<_> = store
            .by_vendor("V1")
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.account_id)
            .collect();
        assert_eq!(accounts, vec!["A1", "A2", "A3"]);
    }
}
