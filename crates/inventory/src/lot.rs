use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tableshop_core::{CampaignId, ItemId, LotId, Quantity, StorageLocationId, WorldDay};

/// A discrete batch of stock for one (campaign, item, storage location)
/// triple.
///
/// Lots are never deleted; consumption drives `quantity_on_hand` toward zero
/// and restocks increase it. `quantity_on_hand` is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLot {
    pub lot_id: LotId,
    pub campaign_id: CampaignId,
    pub item_id: ItemId,
    pub storage_location_id: StorageLocationId,
    pub quantity_on_hand: Quantity,
    pub unit_cost_minor: i64,
    /// FIFO ordering key: the in-game day this stock was acquired.
    pub acquired_world_day: WorldDay,
    pub source: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryLot {
    /// Ordering key for oldest-first allocation: acquisition day, then row
    /// creation time as the tie-breaker.
    pub fn fifo_key(&self) -> (WorldDay, DateTime<Utc>) {
        (self.acquired_world_day, self.created_at)
    }
}

/// Sort lots oldest-first for allocation.
pub fn sort_fifo(lots: &mut [InventoryLot]) {
    lots.sort_by_key(InventoryLot::fifo_key);
}
