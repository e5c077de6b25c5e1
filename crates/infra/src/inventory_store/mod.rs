//! Inventory-side persistence: lots, adjustments, and the processed-event
//! dedup log.
//!
//! Mutations happen inside an [`InventorySession`] so that lot updates,
//! adjustment rows, and the `ProcessedEvent` marker guarding them commit (or
//! vanish) together. Reads within a session observe that session's own
//! staged writes, which matters when one inbound event touches the same
//! (item, location) twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tableshop_core::{CampaignId, ItemId, LotId, Quantity, StorageLocationId, WorldDay};
use tableshop_inventory::{InventoryAdjustment, InventoryLot};

use crate::error::StoreError;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PgInventoryStore;

/// Filters for listing lots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LotFilter {
    pub item_id: Option<ItemId>,
    pub storage_location_id: Option<StorageLocationId>,
}

/// Filters for listing adjustments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjustmentFilter {
    pub from_world_day: Option<WorldDay>,
    pub to_world_day: Option<WorldDay>,
    pub item_id: Option<ItemId>,
    pub storage_location_id: Option<StorageLocationId>,
}

/// Aggregated on-hand stock for one (item, storage location) pair, derived
/// by summing lots with positive quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockSummaryRow {
    pub item_id: ItemId,
    pub storage_location_id: StorageLocationId,
    pub quantity_on_hand: Quantity,
}

#[async_trait]
pub trait InventoryStore: Send + Sync + 'static {
    type Session: InventorySession;

    /// Open a transactional session for one unit of work.
    async fn begin(&self) -> Result<Self::Session, StoreError>;

    /// List lots, FIFO order.
    async fn lots(
        &self,
        campaign_id: CampaignId,
        filter: &LotFilter,
    ) -> Result<Vec<InventoryLot>, StoreError>;

    /// List adjustments, oldest world day first.
    async fn adjustments(
        &self,
        campaign_id: CampaignId,
        filter: &AdjustmentFilter,
    ) -> Result<Vec<InventoryAdjustment>, StoreError>;

    /// On-hand summary per (item, location) from lots with quantity > 0.
    async fn summary(
        &self,
        campaign_id: CampaignId,
        storage_location_id: Option<StorageLocationId>,
    ) -> Result<Vec<StockSummaryRow>, StoreError>;
}

#[async_trait]
pub trait InventorySession: Send {
    /// Idempotency guard: has this inbound event already been applied?
    async fn is_event_processed(&mut self, event_id: Uuid) -> Result<bool, StoreError>;

    /// Lots for one (item, location) pair, FIFO order, including the
    /// session's own staged quantity updates.
    async fn lots_for_item(
        &mut self,
        campaign_id: CampaignId,
        item_id: ItemId,
        storage_location_id: StorageLocationId,
    ) -> Result<Vec<InventoryLot>, StoreError>;

    /// Load one explicitly targeted lot, verifying it belongs to the given
    /// item and location.
    async fn lot_for_item(
        &mut self,
        campaign_id: CampaignId,
        lot_id: LotId,
        item_id: ItemId,
        storage_location_id: StorageLocationId,
    ) -> Result<Option<InventoryLot>, StoreError>;

    async fn insert_lot(&mut self, lot: &InventoryLot) -> Result<(), StoreError>;

    async fn update_lot_quantity(
        &mut self,
        lot_id: LotId,
        quantity_on_hand: Quantity,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn insert_adjustment(
        &mut self,
        adjustment: &InventoryAdjustment,
    ) -> Result<(), StoreError>;

    /// Record the dedup marker for an inbound event. Must commit together
    /// with the mutations it guards.
    async fn mark_event_processed(
        &mut self,
        event_id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}
