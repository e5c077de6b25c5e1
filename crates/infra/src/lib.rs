//! Infrastructure layer: broker adapters, persistence, background workers.
//!
//! The sales store and the inventory store are deliberately separate; the
//! two services never share a transaction or a database. Consistency between
//! them flows exclusively through the transactional outbox, the broker, and
//! the idempotent consumer in [`workers`].

pub mod broker;
pub mod error;
pub mod inventory_store;
pub mod sales_store;
pub mod services;
pub mod workers;

pub use error::StoreError;
