//! In-memory inventory store for tests and dev.
//!
//! Sessions stage writes and apply them atomically on commit. Reads through
//! a session overlay its staged lot-quantity updates onto committed state so
//! that, as inside a real transaction, a unit of work observes its own
//! writes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tableshop_core::{CampaignId, ItemId, LotId, Quantity, StorageLocationId};
use tableshop_inventory::{InventoryAdjustment, InventoryLot, sort_fifo};

use crate::error::StoreError;

use super::{
    AdjustmentFilter, InventorySession, InventoryStore, LotFilter, StockSummaryRow,
};

#[derive(Debug, Default)]
struct InventoryState {
    lots: HashMap<LotId, InventoryLot>,
    adjustments: Vec<InventoryAdjustment>,
    processed_events: HashMap<Uuid, DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<Mutex<InventoryState>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, InventoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Database("inventory state lock poisoned".to_string()))
    }

    /// Test hook: number of processed-event markers.
    pub fn processed_event_count(&self) -> usize {
        self.lock().map(|s| s.processed_events.len()).unwrap_or(0)
    }

    /// Test hook: current quantity of one lot.
    pub fn lot_quantity(&self, lot_id: LotId) -> Option<Quantity> {
        self.lock()
            .ok()?
            .lots
            .get(&lot_id)
            .map(|l| l.quantity_on_hand)
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    type Session = InMemoryInventorySession;

    async fn begin(&self) -> Result<Self::Session, StoreError> {
        Ok(InMemoryInventorySession {
            state: Arc::clone(&self.state),
            staged_lot_quantities: HashMap::new(),
            staged_lots: Vec::new(),
            staged_adjustments: Vec::new(),
            staged_processed: Vec::new(),
        })
    }

    async fn lots(
        &self,
        campaign_id: CampaignId,
        filter: &LotFilter,
    ) -> Result<Vec<InventoryLot>, StoreError> {
        let state = self.lock()?;
        let mut lots: Vec<InventoryLot> = state
            .lots
            .values()
            .filter(|l| l.campaign_id == campaign_id)
            .filter(|l| filter.item_id.is_none_or(|item| l.item_id == item))
            .filter(|l| {
                filter
                    .storage_location_id
                    .is_none_or(|loc| l.storage_location_id == loc)
            })
            .cloned()
            .collect();

        sort_fifo(&mut lots);
        Ok(lots)
    }

    async fn adjustments(
        &self,
        campaign_id: CampaignId,
        filter: &AdjustmentFilter,
    ) -> Result<Vec<InventoryAdjustment>, StoreError> {
        let state = self.lock()?;
        let mut adjustments: Vec<InventoryAdjustment> = state
            .adjustments
            .iter()
            .filter(|a| a.campaign_id == campaign_id)
            .filter(|a| filter.from_world_day.is_none_or(|from| a.world_day >= from))
            .filter(|a| filter.to_world_day.is_none_or(|to| a.world_day <= to))
            .filter(|a| filter.item_id.is_none_or(|item| a.item_id == item))
            .filter(|a| {
                filter
                    .storage_location_id
                    .is_none_or(|loc| a.storage_location_id == loc)
            })
            .cloned()
            .collect();

        adjustments.sort_by(|a, b| {
            a.world_day
                .cmp(&b.world_day)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(adjustments)
    }

    async fn summary(
        &self,
        campaign_id: CampaignId,
        storage_location_id: Option<StorageLocationId>,
    ) -> Result<Vec<StockSummaryRow>, StoreError> {
        let state = self.lock()?;
        let mut totals: HashMap<(ItemId, StorageLocationId), Quantity> = HashMap::new();

        for lot in state.lots.values() {
            if lot.campaign_id != campaign_id || !lot.quantity_on_hand.is_positive() {
                continue;
            }
            if storage_location_id.is_some_and(|loc| lot.storage_location_id != loc) {
                continue;
            }

            let entry = totals
                .entry((lot.item_id, lot.storage_location_id))
                .or_insert(Quantity::ZERO);
            *entry = entry.add(lot.quantity_on_hand);
        }

        let mut rows: Vec<StockSummaryRow> = totals
            .into_iter()
            .map(|((item_id, storage_location_id), quantity_on_hand)| StockSummaryRow {
                item_id,
                storage_location_id,
                quantity_on_hand,
            })
            .collect();

        rows.sort_by_key(|r| (r.item_id, r.storage_location_id));
        Ok(rows)
    }
}

pub struct InMemoryInventorySession {
    state: Arc<Mutex<InventoryState>>,
    /// lot id -> (staged quantity, staged update time).
    staged_lot_quantities: HashMap<LotId, (Quantity, DateTime<Utc>)>,
    staged_lots: Vec<InventoryLot>,
    staged_adjustments: Vec<InventoryAdjustment>,
    staged_processed: Vec<(Uuid, DateTime<Utc>)>,
}

impl InMemoryInventorySession {
    fn lock(&self) -> Result<MutexGuard<'_, InventoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Database("inventory state lock poisoned".to_string()))
    }

    fn overlay(&self, mut lot: InventoryLot) -> InventoryLot {
        if let Some((quantity, updated_at)) = self.staged_lot_quantities.get(&lot.lot_id) {
            lot.quantity_on_hand = *quantity;
            lot.updated_at = *updated_at;
        }
        lot
    }
}

#[async_trait]
impl InventorySession for InMemoryInventorySession {
    async fn is_event_processed(&mut self, event_id: Uuid) -> Result<bool, StoreError> {
        let state = self.lock()?;
        Ok(state.processed_events.contains_key(&event_id))
    }

    async fn lots_for_item(
        &mut self,
        campaign_id: CampaignId,
        item_id: ItemId,
        storage_location_id: StorageLocationId,
    ) -> Result<Vec<InventoryLot>, StoreError> {
        let committed: Vec<InventoryLot> = {
            let state = self.lock()?;
            state
                .lots
                .values()
                .filter(|l| {
                    l.campaign_id == campaign_id
                        && l.item_id == item_id
                        && l.storage_location_id == storage_location_id
                })
                .cloned()
                .collect()
        };

        let mut lots: Vec<InventoryLot> = committed
            .into_iter()
            .map(|lot| self.overlay(lot))
            .collect();

        lots.extend(self.staged_lots.iter().cloned().filter(|l| {
            l.campaign_id == campaign_id
                && l.item_id == item_id
                && l.storage_location_id == storage_location_id
        }));

        sort_fifo(&mut lots);
        Ok(lots)
    }

    async fn lot_for_item(
        &mut self,
        campaign_id: CampaignId,
        lot_id: LotId,
        item_id: ItemId,
        storage_location_id: StorageLocationId,
    ) -> Result<Option<InventoryLot>, StoreError> {
        let committed = {
            let state = self.lock()?;
            state.lots.get(&lot_id).cloned()
        };

        Ok(committed
            .filter(|l| {
                l.campaign_id == campaign_id
                    && l.item_id == item_id
                    && l.storage_location_id == storage_location_id
            })
            .map(|lot| self.overlay(lot)))
    }

    async fn insert_lot(&mut self, lot: &InventoryLot) -> Result<(), StoreError> {
        self.staged_lots.push(lot.clone());
        Ok(())
    }

    async fn update_lot_quantity(
        &mut self,
        lot_id: LotId,
        quantity_on_hand: Quantity,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.staged_lot_quantities
            .insert(lot_id, (quantity_on_hand, updated_at));
        Ok(())
    }

    async fn insert_adjustment(
        &mut self,
        adjustment: &InventoryAdjustment,
    ) -> Result<(), StoreError> {
        self.staged_adjustments.push(adjustment.clone());
        Ok(())
    }

    async fn mark_event_processed(
        &mut self,
        event_id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.staged_processed.push((event_id, processed_at));
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::Database("inventory state lock poisoned".to_string()))?;

        for lot in self.staged_lots {
            state.lots.insert(lot.lot_id, lot);
        }
        for (lot_id, (quantity, updated_at)) in self.staged_lot_quantities {
            if let Some(lot) = state.lots.get_mut(&lot_id) {
                lot.quantity_on_hand = quantity;
                lot.updated_at = updated_at;
            }
        }
        state.adjustments.extend(self.staged_adjustments);
        for (event_id, processed_at) in self.staged_processed {
            state.processed_events.insert(event_id, processed_at);
        }

        Ok(())
    }
}
