//! Order projection stores for orderbus.
//!
//! # Overview
//!
//! This crate provides concrete implementations of
//! [`OrderStore`](orderbus_core::projection::OrderStore):
//! - **In-memory**: sharded concurrent maps, the default backend
//! - **`PostgreSQL`**: persistent table with both read indexes in the database
//!
//! # Choosing a Backend
//!
//! ```text
//! DATABASE_URL unset  →  InMemoryOrderStore   (state lost on restart)
//! DATABASE_URL set    →  PostgresOrderStore   (migrate() creates the table)
//! ```
//!
//! Both backends apply writes to one key atomically and keep the account and
//! vendor indexes consistent with the primary record.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
