//! FIFO lot allocation engine.
//!
//! One pure algorithm shared by the manual adjustment path and the event
//! consumer. The engine never decides what a shortfall means: it reports the
//! walk it would perform (`ConsumptionPlan`) and each caller applies its own
//! policy: the synchronous API rejects, the consumer drains and audits.

use tableshop_core::{DomainError, DomainResult, LotId, Quantity};

use crate::lot::InventoryLot;

/// One lot touched by a consumption walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotConsumption {
    pub lot_id: LotId,
    /// Quantity taken out of this lot (positive).
    pub consumed: Quantity,
    /// The lot's on-hand quantity after the consumption.
    pub remaining_on_hand: Quantity,
}

/// Result of planning a FIFO consumption across the lots of one
/// (item, storage location) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumptionPlan {
    /// Lots to mutate, oldest first. Only lots actually touched appear.
    pub consumptions: Vec<LotConsumption>,
    /// Requested quantity that no lot could cover. Zero when stock sufficed.
    pub shortfall: Quantity,
}

impl ConsumptionPlan {
    pub fn is_fully_covered(&self) -> bool {
        self.shortfall.is_zero()
    }

    /// Total quantity the plan removes from lots.
    pub fn total_consumed(&self) -> Quantity {
        self.consumptions
            .iter()
            .fold(Quantity::ZERO, |acc, c| acc.add(c.consumed))
    }
}

/// Plan the consumption of `required` units, walking lots in ascending
/// `(acquired_world_day, created_at)` order, oldest stock first.
///
/// Lots already at zero (or below, defensively) are skipped. Quantities are
/// renormalized to 3 decimals at every step so repeated small consumptions
/// cannot accumulate drift. `required` must be positive.
pub fn plan_consumption(lots: &[InventoryLot], required: Quantity) -> ConsumptionPlan {
    let mut ordered: Vec<&InventoryLot> = lots.iter().collect();
    ordered.sort_by_key(|lot| lot.fifo_key());

    let mut consumptions = Vec::new();
    let mut remaining = required;

    for lot in ordered {
        if !remaining.is_positive() {
            break;
        }

        if !lot.quantity_on_hand.is_positive() {
            continue;
        }

        let consumed = lot.quantity_on_hand.min(remaining);
        if !consumed.is_positive() {
            continue;
        }

        consumptions.push(LotConsumption {
            lot_id: lot.lot_id,
            consumed,
            remaining_on_hand: lot.quantity_on_hand.sub(consumed),
        });
        remaining = remaining.sub(consumed);
    }

    ConsumptionPlan {
        consumptions,
        shortfall: if remaining.is_positive() {
            remaining
        } else {
            Quantity::ZERO
        },
    }
}

/// A restock applied to the oldest existing lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotRestock {
    pub lot_id: LotId,
    pub new_quantity: Quantity,
}

/// Apply a positive correction without an explicit lot target: the single
/// oldest lot absorbs the whole delta.
///
/// Stock from a known source must be recorded by creating a lot explicitly;
/// with no lot to anchor to, a correction is an error.
pub fn restock_oldest(lots: &[InventoryLot], delta: Quantity) -> DomainResult<LotRestock> {
    let oldest = lots
        .iter()
        .min_by_key(|lot| lot.fifo_key())
        .ok_or_else(|| {
            DomainError::validation(
                "no lots found for this item and storage location; provide lotId or create a lot first",
            )
        })?;

    Ok(LotRestock {
        lot_id: oldest.lot_id,
        new_quantity: oldest.quantity_on_hand.add(delta),
    })
}

/// Apply a signed delta to one explicitly targeted lot, bypassing FIFO
/// selection. The lot quantity must stay non-negative.
pub fn apply_to_lot(lot: &InventoryLot, delta: Quantity) -> DomainResult<Quantity> {
    let updated = lot.quantity_on_hand.add(delta);
    if updated.is_negative() {
        return Err(DomainError::insufficient_stock(
            "insufficient stock for the requested adjustment",
        ));
    }
    Ok(updated)
}
