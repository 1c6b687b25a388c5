//! Fault injection for projection stores.

use orderbus_core::projection::{
    AccountOrderView, OrderKey, OrderMutation, OrderRecord, OrderStore, StoreError, StoreFuture,
    VendorOrderView,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Wraps any [`OrderStore`] and fails operations on demand.
///
/// Failures are reported as [`StoreError::Unavailable`] before the inner
/// store is touched, so a failed write never mutates anything.
///
/// # Example
///
/// ```ignore
/// let store = FaultyOrderStore::new(InMemoryOrderStore::new());
/// store.fail_next(2); // next two operations fail, the third goes through
/// store.set_unavailable(true); // every operation fails until reset
/// ```
#[derive(Debug, Default)]
pub struct FaultyOrderStore<S> {
    inner: S,
    fail_next: AtomicU32,
    unavailable: AtomicBool,
    calls: AtomicU32,
}

impl<S: OrderStore> FaultyOrderStore<S> {
    /// Wrap `inner`; no faults are armed.
    #[must_use]
    pub const fn new(inner: S) -> Self {
        Self {
            inner,
            fail_next: AtomicU32::new(0),
            unavailable: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        }
    }

    /// Fail the next `count` operations.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Fail every operation while `unavailable` is set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Operations attempted, failed or not.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked unavailable".into()));
        }

        let armed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if armed.is_ok() {
            return Err(StoreError::Unavailable("injected failure".into()));
        }

        Ok(())
    }
}

impl<S: OrderStore> OrderStore for FaultyOrderStore<S> {
    fn get<'a>(&'a self, key: &'a OrderKey) -> StoreFuture<'a, Option<OrderRecord>> {
        match self.check() {
            Ok(()) => self.inner.get(key),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn put_if_absent(&self, record: OrderRecord) -> StoreFuture<'_, bool> {
        match self.check() {
            Ok(()) => self.inner.put_if_absent(record),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn update<'a>(&'a self, key: &'a OrderKey, mutation: OrderMutation) -> StoreFuture<'a, bool> {
        match self.check() {
            Ok(()) => self.inner.update(key, mutation),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn by_account<'a>(&'a self, account_id: &'a str) -> StoreFuture<'a, Vec<AccountOrderView>> {
        match self.check() {
            Ok(()) => self.inner.by_account(account_id),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn by_vendor<'a>(&'a self, vendor_id: &'a str) -> StoreFuture<'a, Vec<VendorOrderView>> {
        match self.check() {
            Ok(()) => self.inner.by_vendor(vendor_id),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }
}
