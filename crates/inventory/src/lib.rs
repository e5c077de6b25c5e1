//! Inventory domain module.
//!
//! This crate contains business rules for the lot-based stock ledger,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage). The FIFO allocation engine here is the single implementation
//! used by both the manual adjustment path and the event consumer; the two
//! call sites differ only in how they treat a shortfall.

pub mod adjustment;
pub mod allocation;
pub mod lot;

pub use adjustment::{AdjustmentReason, AdjustmentReference, InventoryAdjustment};
pub use allocation::{
    ConsumptionPlan, LotConsumption, LotRestock, apply_to_lot, plan_consumption, restock_oldest,
};
pub use lot::{InventoryLot, sort_fifo};
