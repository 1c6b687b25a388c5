//! `PostgreSQL` order store.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE orders (
//!     accountid TEXT NOT NULL,
//!     vendorid  TEXT NOT NULL,
//!     orderdate TEXT NOT NULL,
//!     details   JSONB NOT NULL,
//!     city      TEXT,
//!     PRIMARY KEY (accountid, vendorid)
//! );
//! CREATE INDEX orders_by_account ON orders (accountid, orderdate, vendorid);
//! CREATE INDEX orders_by_vendor  ON orders (vendorid, orderdate, accountid);
//! ```
//!
//! Writes are single conditional statements (`INSERT .. ON CONFLICT DO
//! NOTHING`, `UPDATE .. WHERE key`), so concurrent handlers racing on one key
//! never need an application-level lock. The indexes are maintained by the
//! database.
//!
//! # Example
//!
//! ```ignore
//! use orderbus_projections::PostgresOrderStore;
//!
//! let store = PostgresOrderStore::connect("postgres://localhost/orders", "orders", 10).await?;
//! store.migrate().await?;
//! ```

use orderbus_core::projection::{
    AccountOrderView, OrderKey, OrderMutation, OrderRecord, OrderStore, Result, StoreError,
    StoreFuture, VendorOrderView,
};
use orderbus_runtime::metrics::StoreMetrics;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Instant;

/// PostgreSQL-backed [`OrderStore`].
#[derive(Clone, Debug)]
pub struct PostgresOrderStore {
    pool: PgPool,
    table_name: String,
}

impl PostgresOrderStore {
    /// Create a store on an existing pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if `table_name` is not a plain SQL
    /// identifier (ASCII letters, digits and `_`, not starting with a digit).
    pub fn new(pool: PgPool, table_name: impl Into<String>) -> Result<Self> {
        let table_name = table_name.into();
        if !is_identifier(&table_name) {
            return Err(StoreError::Unavailable(format!(
                "Invalid table name: {table_name:?}"
            )));
        }
        Ok(Self { pool, table_name })
    }

    /// Connect a new pool and create a store on it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if connection fails or the table name
    /// is invalid.
    pub async fn connect(
        database_url: &str,
        table_name: impl Into<String>,
        max_connections: u32,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect: {e}")))?;

        Self::new(pool, table_name)
    }

    /// Create the table and both indexes if they don't already exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if a statement fails.
    pub async fn migrate(&self) -> Result<()> {
        let table = &self.table_name;
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    accountid TEXT NOT NULL,
                    vendorid TEXT NOT NULL,
                    orderdate TEXT NOT NULL,
                    details JSONB NOT NULL,
                    city TEXT,
                    PRIMARY KEY (accountid, vendorid)
                )"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {table}_by_account
                 ON {table} (accountid, orderdate, vendorid)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {table}_by_vendor
                 ON {table} (vendorid, orderdate, accountid)"
            ),
        ];

        for statement in &statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Unavailable(format!("Migration failed: {e}")))?;
        }

        tracing::info!(table = %self.table_name, "Order table migrated");
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the table name for this store.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn get_record(&self, key: &OrderKey) -> Result<Option<OrderRecord>> {
        let query = format!(
            "SELECT accountid, vendorid, orderdate, details, city
             FROM {} WHERE accountid = $1 AND vendorid = $2",
            self.table_name
        );

        let row: Option<(String, String, String, Value, Option<String>)> = sqlx::query_as(&query)
            .bind(&key.account_id)
            .bind(&key.vendor_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_error("get", &e))?;

        Ok(row.map(
            |(account_id, vendor_id, order_date, details, city)| OrderRecord {
                account_id,
                vendor_id,
                order_date,
                details,
                city,
            },
        ))
    }

    async fn insert_record(&self, record: OrderRecord) -> Result<bool> {
        let query = format!(
            "INSERT INTO {} (accountid, vendorid, orderdate, details, city)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (accountid, vendorid) DO NOTHING",
            self.table_name
        );

        let result = sqlx::query(&query)
            .bind(&record.account_id)
            .bind(&record.vendor_id)
            .bind(&record.order_date)
            .bind(&record.details)
            .bind(&record.city)
            .execute(&self.pool)
            .await
            .map_err(|e| map_error("put_if_absent", &e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_record(&self, key: &OrderKey, mutation: OrderMutation) -> Result<bool> {
        let query = format!(
            "UPDATE {} SET orderdate = $3, details = $4
             WHERE accountid = $1 AND vendorid = $2",
            self.table_name
        );

        let result = sqlx::query(&query)
            .bind(&key.account_id)
            .bind(&key.vendor_id)
            .bind(&mutation.order_date)
            .bind(&mutation.details)
            .execute(&self.pool)
            .await
            .map_err(|e| map_error("update", &e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn account_rows(&self, account_id: &str) -> Result<Vec<AccountOrderView>> {
        let query = format!(
            "SELECT accountid, orderdate, vendorid, details
             FROM {} WHERE accountid = $1
             ORDER BY orderdate, vendorid",
            self.table_name
        );

        let rows: Vec<(String, String, String, Value)> = sqlx::query_as(&query)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_error("by_account", &e))?;

        Ok(rows
            .into_iter()
            .map(|(account_id, order_date, vendor_id, details)| AccountOrderView {
                account_id,
                order_date,
                vendor_id,
                details,
            })
            .collect())
    }

    async fn vendor_rows(&self, vendor_id: &str) -> Result<Vec<VendorOrderView>> {
        let query = format!(
            "SELECT vendorid, orderdate, accountid, details
             FROM {} WHERE vendorid = $1
             ORDER BY orderdate, accountid",
            self.table_name
        );

        let rows: Vec<(String, String, String, Value)> = sqlx::query_as(&query)
            .bind(vendor_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_error("by_vendor", &e))?;

        Ok(rows
            .into_iter()
            .map(|(vendor_id, order_date, account_id, details)| VendorOrderView {
                vendor_id,
                order_date,
                account_id,
                details,
            })
            .collect())
    }
}

impl OrderStore for PostgresOrderStore {
    fn get<'a>(&'a self, key: &'a OrderKey) -> StoreFuture<'a, Option<OrderRecord>> {
        Box::pin(timed("get", self.get_record(key)))
    }

    fn put_if_absent(&self, record: OrderRecord) -> StoreFuture<'_, bool> {
        Box::pin(timed("put_if_absent", self.insert_record(record)))
    }

    fn update<'a>(&'a self, key: &'a OrderKey, mutation: OrderMutation) -> StoreFuture<'a, bool> {
        Box::pin(timed("update", self.update_record(key, mutation)))
    }

    fn by_account<'a>(&'a self, account_id: &'a str) -> StoreFuture<'a, Vec<AccountOrderView>> {
        Box::pin(timed("by_account", self.account_rows(account_id)))
    }

    fn by_vendor<'a>(&'a self, vendor_id: &'a str) -> StoreFuture<'a, Vec<VendorOrderView>> {
        Box::pin(timed("by_vendor", self.vendor_rows(vendor_id)))
    }
}

async fn timed<T>(
    operation: &'static str,
    future: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    let started = Instant::now();
    let result = future.await;
    StoreMetrics::record_operation(operation, result.is_ok(), started.elapsed());
    result
}

fn map_error(operation: &str, error: &sqlx::Error) -> StoreError {
    tracing::warn!(operation, error = %error, "Order store operation failed");
    match error {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Serialization(format!("{operation}: {error}"))
        }
        _ => StoreError::Unavailable(format!("{operation}: {error}")),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
