//! Inventory-service operations: lot creation and manual adjustments.
//!
//! The manual path is the strict call site of the allocation engine: a
//! shortfall is a hard rejection and nothing is persisted. The tolerant call
//! site lives in the event consumer.

use chrono::Utc;

use tableshop_core::{
    AdjustmentId, CampaignId, DomainError, ItemId, LotId, Quantity, StorageLocationId, UserId,
    WorldDay,
};
use tableshop_inventory::{
    AdjustmentReason, AdjustmentReference, InventoryAdjustment, InventoryLot, apply_to_lot,
    plan_consumption, restock_oldest,
};

use crate::inventory_store::{InventorySession, InventoryStore};

use super::ServiceError;

#[derive(Debug, Clone)]
pub struct CreateLotCommand {
    pub campaign_id: CampaignId,
    pub item_id: ItemId,
    pub storage_location_id: StorageLocationId,
    pub quantity: Quantity,
    pub unit_cost_minor: i64,
    pub acquired_world_day: WorldDay,
    pub source: Option<String>,
    pub notes: Option<String>,
    pub created_by_user_id: UserId,
}

/// Create a lot. Always also writes one `Restock` adjustment in the same
/// unit of work, so the ledger accounts for the initial quantity.
pub async fn create_lot<I: InventoryStore>(
    store: &I,
    command: CreateLotCommand,
) -> Result<LotId, ServiceError> {
    if !command.quantity.is_positive() {
        return Err(DomainError::validation("quantity must be greater than 0").into());
    }

    if command.unit_cost_minor < 0 {
        return Err(
            DomainError::validation("unitCostMinor must be greater than or equal to 0").into(),
        );
    }

    let now = Utc::now();
    let lot = InventoryLot {
        lot_id: LotId::new(),
        campaign_id: command.campaign_id,
        item_id: command.item_id,
        storage_location_id: command.storage_location_id,
        quantity_on_hand: command.quantity,
        unit_cost_minor: command.unit_cost_minor,
        acquired_world_day: command.acquired_world_day,
        source: command.source,
        notes: command.notes.clone(),
        created_at: now,
        updated_at: now,
    };

    let adjustment = InventoryAdjustment {
        adjustment_id: AdjustmentId::new(),
        campaign_id: command.campaign_id,
        item_id: command.item_id,
        storage_location_id: command.storage_location_id,
        lot_id: Some(lot.lot_id),
        delta_quantity: command.quantity,
        reason: AdjustmentReason::Restock,
        world_day: command.acquired_world_day,
        notes: command.notes,
        reference: None,
        created_by_user_id: command.created_by_user_id,
        created_at: now,
    };

    let mut session = store.begin().await?;
    session.insert_lot(&lot).await?;
    session.insert_adjustment(&adjustment).await?;
    session.commit().await?;

    Ok(lot.lot_id)
}

#[derive(Debug, Clone)]
pub struct ManualAdjustmentCommand {
    pub campaign_id: CampaignId,
    pub item_id: ItemId,
    pub storage_location_id: StorageLocationId,
    /// Explicit lot target, bypassing FIFO selection.
    pub lot_id: Option<LotId>,
    pub delta_quantity: Quantity,
    pub reason: AdjustmentReason,
    pub world_day: WorldDay,
    pub notes: Option<String>,
    pub reference: Option<AdjustmentReference>,
    pub created_by_user_id: UserId,
}

/// Apply a manual stock adjustment.
///
/// Insufficient stock is a hard rejection here: no lot is touched and no
/// adjustment row is written. The same deficit arriving via a sale event is
/// instead tolerated and audited (see the consumer worker); that asymmetry
/// is intentional.
pub async fn record_manual_adjustment<I: InventoryStore>(
    store: &I,
    command: ManualAdjustmentCommand,
) -> Result<AdjustmentId, ServiceError> {
    if command.delta_quantity.is_zero() {
        return Err(DomainError::validation("deltaQuantity must be non-zero").into());
    }

    let now = Utc::now();
    let mut session = store.begin().await?;

    if let Some(lot_id) = command.lot_id {
        let lot = session
            .lot_for_item(
                command.campaign_id,
                lot_id,
                command.item_id,
                command.storage_location_id,
            )
            .await?
            .ok_or_else(|| {
                DomainError::validation(
                    "lotId is invalid for itemId and storageLocationId in this campaign",
                )
            })?;

        let updated = apply_to_lot(&lot, command.delta_quantity).map_err(ServiceError::Domain)?;
        session.update_lot_quantity(lot.lot_id, updated, now).await?;
    } else {
        let lots = session
            .lots_for_item(
                command.campaign_id,
                command.item_id,
                command.storage_location_id,
            )
            .await?;

        if command.delta_quantity.is_positive() {
            let restock =
                restock_oldest(&lots, command.delta_quantity).map_err(ServiceError::Domain)?;
            session
                .update_lot_quantity(restock.lot_id, restock.new_quantity, now)
                .await?;
        } else {
            let required = command.delta_quantity.abs();
            let plan = plan_consumption(&lots, required);

            if !plan.is_fully_covered() {
                return Err(DomainError::insufficient_stock(
                    "insufficient stock for the requested adjustment",
                )
                .into());
            }

            for consumption in &plan.consumptions {
                session
                    .update_lot_quantity(consumption.lot_id, consumption.remaining_on_hand, now)
                    .await?;
            }
        }
    }

    let adjustment = InventoryAdjustment {
        adjustment_id: AdjustmentId::new(),
        campaign_id: command.campaign_id,
        item_id: command.item_id,
        storage_location_id: command.storage_location_id,
        lot_id: command.lot_id,
        delta_quantity: command.delta_quantity,
        reason: command.reason,
        world_day: command.world_day,
        notes: command.notes,
        reference: command.reference,
        created_by_user_id: command.created_by_user_id,
        created_at: now,
    };

    session.insert_adjustment(&adjustment).await?;
    session.commit().await?;

    Ok(adjustment.adjustment_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory_store::{AdjustmentFilter, InMemoryInventoryStore, LotFilter};

    fn lot_command(
        campaign_id: CampaignId,
        item_id: ItemId,
        loc: StorageLocationId,
        day: i32,
        quantity: i64,
    ) -> CreateLotCommand {
        CreateLotCommand {
            campaign_id,
            item_id,
            storage_location_id: loc,
            quantity: Quantity::from_i64(quantity),
            unit_cost_minor: 100,
            acquired_world_day: WorldDay::new(day).unwrap(),
            source: None,
            notes: None,
            created_by_user_id: UserId::new(),
        }
    }

    fn consume_command(
        campaign_id: CampaignId,
        item_id: ItemId,
        loc: StorageLocationId,
        delta: i64,
    ) -> ManualAdjustmentCommand {
        ManualAdjustmentCommand {
            campaign_id,
            item_id,
            storage_location_id: loc,
            lot_id: None,
            delta_quantity: Quantity::from_i64(delta),
            reason: AdjustmentReason::Damage,
            world_day: WorldDay::new(12).unwrap(),
            notes: None,
            reference: None,
            created_by_user_id: UserId::new(),
        }
    }

    #[tokio::test]
    async fn creating_a_lot_also_writes_a_restock_adjustment() {
        let store = InMemoryInventoryStore::new();
        let campaign_id = CampaignId::new();
        let item_id = ItemId::new();
        let loc = StorageLocationId::new();

        let lot_id = create_lot(&store, lot_command(campaign_id, item_id, loc, 10, 5))
            .await
            .unwrap();

        let adjustments = store
            .adjustments(campaign_id, &AdjustmentFilter::default())
            .await
            .unwrap();
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments[0].reason, AdjustmentReason::Restock);
        assert_eq!(adjustments[0].lot_id, Some(lot_id));
        assert_eq!(adjustments[0].delta_quantity, Quantity::from_i64(5));
    }

    #[tokio::test]
    async fn fifo_consumption_depletes_oldest_lots_first() {
        let store = InMemoryInventoryStore::new();
        let campaign_id = CampaignId::new();
        let item_id = ItemId::new();
        let loc = StorageLocationId::new();

        let day10 = create_lot(&store, lot_command(campaign_id, item_id, loc, 10, 5))
            .await
            .unwrap();
        let day12 = create_lot(&store, lot_command(campaign_id, item_id, loc, 12, 5))
            .await
            .unwrap();
        let day15 = create_lot(&store, lot_command(campaign_id, item_id, loc, 15, 5))
            .await
            .unwrap();

        record_manual_adjustment(&store, consume_command(campaign_id, item_id, loc, -8))
            .await
            .unwrap();

        assert_eq!(store.lot_quantity(day10), Some(Quantity::ZERO));
        assert_eq!(store.lot_quantity(day12), Some(Quantity::from_i64(2)));
        assert_eq!(store.lot_quantity(day15), Some(Quantity::from_i64(5)));
    }

    #[tokio::test]
    async fn insufficient_stock_is_rejected_with_no_mutation() {
        let store = InMemoryInventoryStore::new();
        let campaign_id = CampaignId::new();
        let item_id = ItemId::new();
        let loc = StorageLocationId::new();

        let lot_id = create_lot(&store, lot_command(campaign_id, item_id, loc, 10, 5))
            .await
            .unwrap();

        let err = record_manual_adjustment(&store, consume_command(campaign_id, item_id, loc, -8))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::InsufficientStock(_))
        ));

        // Nothing moved, nothing audited beyond the original restock.
        assert_eq!(store.lot_quantity(lot_id), Some(Quantity::from_i64(5)));
        let adjustments = store
            .adjustments(campaign_id, &AdjustmentFilter::default())
            .await
            .unwrap();
        assert_eq!(adjustments.len(), 1);
    }

    #[tokio::test]
    async fn positive_correction_without_lot_goes_to_oldest_lot() {
        let store = InMemoryInventoryStore::new();
        let campaign_id = CampaignId::new();
        let item_id = ItemId::new();
        let loc = StorageLocationId::new();

        let oldest = create_lot(&store, lot_command(campaign_id, item_id, loc, 10, 5))
            .await
            .unwrap();
        let newer = create_lot(&store, lot_command(campaign_id, item_id, loc, 12, 5))
            .await
            .unwrap();

        record_manual_adjustment(&store, {
            let mut c = consume_command(campaign_id, item_id, loc, 3);
            c.reason = AdjustmentReason::ManualCorrection;
            c
        })
        .await
        .unwrap();

        assert_eq!(store.lot_quantity(oldest), Some(Quantity::from_i64(8)));
        assert_eq!(store.lot_quantity(newer), Some(Quantity::from_i64(5)));
    }

    #[tokio::test]
    async fn positive_correction_with_no_lots_is_an_error() {
        let store = InMemoryInventoryStore::new();
        let campaign_id = CampaignId::new();

        let err = record_manual_adjustment(
            &store,
            consume_command(campaign_id, ItemId::new(), StorageLocationId::new(), 3),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn explicit_lot_target_bypasses_fifo_and_guards_negative() {
        let store = InMemoryInventoryStore::new();
        let campaign_id = CampaignId::new();
        let item_id = ItemId::new();
        let loc = StorageLocationId::new();

        let older = create_lot(&store, lot_command(campaign_id, item_id, loc, 10, 5))
            .await
            .unwrap();
        let target = create_lot(&store, lot_command(campaign_id, item_id, loc, 12, 5))
            .await
            .unwrap();

        let mut command = consume_command(campaign_id, item_id, loc, -4);
        command.lot_id = Some(target);
        record_manual_adjustment(&store, command.clone()).await.unwrap();

        // FIFO order would have drained the older lot; the explicit target
        // absorbed everything instead.
        assert_eq!(store.lot_quantity(older), Some(Quantity::from_i64(5)));
        assert_eq!(store.lot_quantity(target), Some(Quantity::from_i64(1)));

        command.delta_quantity = Quantity::from_i64(-2);
        let err = record_manual_adjustment(&store, command).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::InsufficientStock(_))
        ));
    }

    #[tokio::test]
    async fn unknown_explicit_lot_is_a_validation_error() {
        let store = InMemoryInventoryStore::new();
        let campaign_id = CampaignId::new();
        let item_id = ItemId::new();
        let loc = StorageLocationId::new();
        create_lot(&store, lot_command(campaign_id, item_id, loc, 10, 5))
            .await
            .unwrap();

        let mut command = consume_command(campaign_id, item_id, loc, -1);
        command.lot_id = Some(LotId::new());

        let err = record_manual_adjustment(&store, command).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn lots_listing_is_fifo_ordered(){
        let store = InMemoryInventoryStore::new();
        let campaign_id = CampaignId::new();
        let item_id = ItemId::new();
        let loc = StorageLocationId::new();

        create_lot(&store, lot_command(campaign_id, item_id, loc, 12, 5)).await.unwrap();
        create_lot(&store, lot_command(campaign_id, item_id, loc, 10, 5)).await.unwrap();

        let lots = store.lots(campaign_id, &LotFilter::default()).await.unwrap();
        assert_eq!(lots[0].acquired_world_day.value(), 10);
        assert_eq!(lots[1].acquired_world_day.value(), 12);
    }
}
