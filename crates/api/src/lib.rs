//! HTTP surface for the tableshop services.
//!
//! One binary serves both route groups (sales and inventory). The services
//! stay storage-isolated: each group only ever touches its own store, and
//! stock consistency flows through the outbox/consumer pipeline, never
//! through a shared transaction.

pub mod app;
pub mod context;
