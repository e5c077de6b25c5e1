//! Sales domain module.
//!
//! This crate contains business rules for sales orders, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod completion;
pub mod order;

pub use completion::{
    SaleTotals, build_completed_event, ensure_completable, ensure_voidable, line_subtotal_minor,
    recompute_totals,
};
pub use order::{SaleStatus, SalesOrder, SalesOrderLine};
