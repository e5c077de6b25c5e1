//! Postgres-backed inventory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use tableshop_core::{
    AdjustmentId, CampaignId, ItemId, LotId, Quantity, StorageLocationId, UserId, WorldDay,
};
use tableshop_inventory::{
    AdjustmentReason, AdjustmentReference, InventoryAdjustment, InventoryLot,
};

use crate::error::StoreError;

use super::{
    AdjustmentFilter, InventorySession, InventoryStore, LotFilter, StockSummaryRow,
};

/// Inventory-service persistence over a sqlx Postgres pool.
#[derive(Debug, Clone)]
pub struct PgInventoryStore {
    pool: PgPool,
}

impl PgInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the inventory-service tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS inventory_lots (
                lot_id UUID PRIMARY KEY,
                campaign_id UUID NOT NULL,
                item_id UUID NOT NULL,
                storage_location_id UUID NOT NULL,
                quantity_on_hand NUMERIC(12,3) NOT NULL CHECK (quantity_on_hand >= 0),
                unit_cost_minor BIGINT NOT NULL,
                acquired_world_day INTEGER NOT NULL CHECK (acquired_world_day >= 0),
                source TEXT NULL,
                notes TEXT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS ix_inventory_lots_fifo
                ON inventory_lots (campaign_id, item_id, storage_location_id,
                                   acquired_world_day, created_at)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS inventory_adjustments (
                adjustment_id UUID PRIMARY KEY,
                campaign_id UUID NOT NULL,
                item_id UUID NOT NULL,
                storage_location_id UUID NOT NULL,
                lot_id UUID NULL,
                delta_quantity NUMERIC(12,3) NOT NULL,
                reason TEXT NOT NULL,
                world_day INTEGER NOT NULL CHECK (world_day >= 0),
                notes TEXT NULL,
                reference_type TEXT NULL,
                reference_id UUID NULL,
                created_by_user_id UUID NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS ix_inventory_adjustments_campaign_day
                ON inventory_adjustments (campaign_id, world_day, created_at)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS processed_events (
                event_id UUID PRIMARY KEY,
                processed_at TIMESTAMPTZ NOT NULL
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}

fn map_lot_row(row: &PgRow) -> Result<InventoryLot, StoreError> {
    Ok(InventoryLot {
        lot_id: LotId::from_uuid(row.try_get("lot_id")?),
        campaign_id: CampaignId::from_uuid(row.try_get("campaign_id")?),
        item_id: ItemId::from_uuid(row.try_get("item_id")?),
        storage_location_id: StorageLocationId::from_uuid(row.try_get("storage_location_id")?),
        quantity_on_hand: Quantity::new(row.try_get("quantity_on_hand")?),
        unit_cost_minor: row.try_get("unit_cost_minor")?,
        acquired_world_day: WorldDay::clamped(row.try_get("acquired_world_day")?),
        source: row.try_get("source")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_adjustment_row(row: &PgRow) -> Result<InventoryAdjustment, StoreError> {
    let reason: String = row.try_get("reason")?;
    let reason: AdjustmentReason = reason
        .parse()
        .map_err(|e| StoreError::Database(format!("invalid adjustment reason in row: {e}")))?;

    let reference_type: Option<String> = row.try_get("reference_type")?;
    let reference_id: Option<Uuid> = row.try_get("reference_id")?;
    let reference = match (reference_type, reference_id) {
        (Some(reference_type), Some(reference_id)) => Some(AdjustmentReference {
            reference_type,
            reference_id,
        }),
        _ => None,
    };

    Ok(InventoryAdjustment {
        adjustment_id: AdjustmentId::from_uuid(row.try_get("adjustment_id")?),
        campaign_id: CampaignId::from_uuid(row.try_get("campaign_id")?),
        item_id: ItemId::from_uuid(row.try_get("item_id")?),
        storage_location_id: StorageLocationId::from_uuid(row.try_get("storage_location_id")?),
        lot_id: row
            .try_get::<Option<Uuid>, _>("lot_id")?
            .map(LotId::from_uuid),
        delta_quantity: Quantity::new(row.try_get("delta_quantity")?),
        reason,
        world_day: WorldDay::clamped(row.try_get("world_day")?),
        notes: row.try_get("notes")?,
        reference,
        created_by_user_id: UserId::from_uuid(row.try_get("created_by_user_id")?),
        created_at: row.try_get("created_at")?,
    })
}

const LOT_COLUMNS: &str = r#"
    lot_id, campaign_id, item_id, storage_location_id, quantity_on_hand,
    unit_cost_minor, acquired_world_day, source, notes, created_at, updated_at
"#;

const ADJUSTMENT_COLUMNS: &str = r#"
    adjustment_id, campaign_id, item_id, storage_location_id, lot_id,
    delta_quantity, reason, world_day, notes, reference_type, reference_id,
    created_by_user_id, created_at
"#;

#[async_trait]
impl InventoryStore for PgInventoryStore {
    type Session = PgInventorySession;

    async fn begin(&self) -> Result<Self::Session, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgInventorySession { tx })
    }

    async fn lots(
        &self,
        campaign_id: CampaignId,
        filter: &LotFilter,
    ) -> Result<Vec<InventoryLot>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOT_COLUMNS}
            FROM inventory_lots
            WHERE campaign_id = $1
              AND ($2::uuid IS NULL OR item_id = $2)
              AND ($3::uuid IS NULL OR storage_location_id = $3)
            ORDER BY acquired_world_day, created_at
            "#
        ))
        .bind(campaign_id.as_uuid())
        .bind(filter.item_id.map(|i| *i.as_uuid()))
        .bind(filter.storage_location_id.map(|s| *s.as_uuid()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_lot_row).collect()
    }

    async fn adjustments(
        &self,
        campaign_id: CampaignId,
        filter: &AdjustmentFilter,
    ) -> Result<Vec<InventoryAdjustment>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ADJUSTMENT_COLUMNS}
            FROM inventory_adjustments
            WHERE campaign_id = $1
              AND ($2::int IS NULL OR world_day >= $2)
              AND ($3::int IS NULL OR world_day <= $3)
              AND ($4::uuid IS NULL OR item_id = $4)
              AND ($5::uuid IS NULL OR storage_location_id = $5)
            ORDER BY world_day, created_at
            "#
        ))
        .bind(campaign_id.as_uuid())
        .bind(filter.from_world_day.map(|d| d.value()))
        .bind(filter.to_world_day.map(|d| d.value()))
        .bind(filter.item_id.map(|i| *i.as_uuid()))
        .bind(filter.storage_location_id.map(|s| *s.as_uuid()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_adjustment_row).collect()
    }

    async fn summary(
        &self,
        campaign_id: CampaignId,
        storage_location_id: Option<StorageLocationId>,
    ) -> Result<Vec<StockSummaryRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT item_id, storage_location_id, SUM(quantity_on_hand) AS quantity_on_hand
            FROM inventory_lots
            WHERE campaign_id = $1
              AND quantity_on_hand > 0
              AND ($2::uuid IS NULL OR storage_location_id = $2)
            GROUP BY item_id, storage_location_id
            ORDER BY item_id, storage_location_id
            "#,
        )
        .bind(campaign_id.as_uuid())
        .bind(storage_location_id.map(|s| *s.as_uuid()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(StockSummaryRow {
                    item_id: ItemId::from_uuid(row.try_get("item_id")?),
                    storage_location_id: StorageLocationId::from_uuid(
                        row.try_get("storage_location_id")?,
                    ),
                    quantity_on_hand: Quantity::new(row.try_get("quantity_on_hand")?),
                })
            })
            .collect()
    }
}

/// One inventory-service unit of work over a Postgres transaction.
pub struct PgInventorySession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl InventorySession for PgInventorySession {
    async fn is_event_processed(&mut self, event_id: Uuid) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 AS present FROM processed_events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.is_some())
    }

    async fn lots_for_item(
        &mut self,
        campaign_id: CampaignId,
        item_id: ItemId,
        storage_location_id: StorageLocationId,
    ) -> Result<Vec<InventoryLot>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOT_COLUMNS}
            FROM inventory_lots
            WHERE campaign_id = $1 AND item_id = $2 AND storage_location_id = $3
            ORDER BY acquired_world_day, created_at
            FOR UPDATE
            "#
        ))
        .bind(campaign_id.as_uuid())
        .bind(item_id.as_uuid())
        .bind(storage_location_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(map_lot_row).collect()
    }

    async fn lot_for_item(
        &mut self,
        campaign_id: CampaignId,
        lot_id: LotId,
        item_id: ItemId,
        storage_location_id: StorageLocationId,
    ) -> Result<Option<InventoryLot>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {LOT_COLUMNS}
            FROM inventory_lots
            WHERE campaign_id = $1 AND lot_id = $2
              AND item_id = $3 AND storage_location_id = $4
            FOR UPDATE
            "#
        ))
        .bind(campaign_id.as_uuid())
        .bind(lot_id.as_uuid())
        .bind(item_id.as_uuid())
        .bind(storage_location_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(map_lot_row).transpose()
    }

    async fn insert_lot(&mut self, lot: &InventoryLot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_lots (
                lot_id, campaign_id, item_id, storage_location_id,
                quantity_on_hand, unit_cost_minor, acquired_world_day,
                source, notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(lot.lot_id.as_uuid())
        .bind(lot.campaign_id.as_uuid())
        .bind(lot.item_id.as_uuid())
        .bind(lot.storage_location_id.as_uuid())
        .bind(lot.quantity_on_hand.into_inner())
        .bind(lot.unit_cost_minor)
        .bind(lot.acquired_world_day.value())
        .bind(lot.source.as_deref())
        .bind(lot.notes.as_deref())
        .bind(lot.created_at)
        .bind(lot.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_lot_quantity(
        &mut self,
        lot_id: LotId,
        quantity_on_hand: Quantity,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE inventory_lots
            SET quantity_on_hand = $2, updated_at = $3
            WHERE lot_id = $1
            "#,
        )
        .bind(lot_id.as_uuid())
        .bind(quantity_on_hand.into_inner())
        .bind(updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_adjustment(
        &mut self,
        adjustment: &InventoryAdjustment,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_adjustments (
                adjustment_id, campaign_id, item_id, storage_location_id,
                lot_id, delta_quantity, reason, world_day, notes,
                reference_type, reference_id, created_by_user_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(adjustment.adjustment_id.as_uuid())
        .bind(adjustment.campaign_id.as_uuid())
        .bind(adjustment.item_id.as_uuid())
        .bind(adjustment.storage_location_id.as_uuid())
        .bind(adjustment.lot_id.map(|l| *l.as_uuid()))
        .bind(adjustment.delta_quantity.into_inner())
        .bind(adjustment.reason.as_str())
        .bind(adjustment.world_day.value())
        .bind(adjustment.notes.as_deref())
        .bind(adjustment.reference.as_ref().map(|r| r.reference_type.clone()))
        .bind(adjustment.reference.as_ref().map(|r| r.reference_id))
        .bind(adjustment.created_by_user_id.as_uuid())
        .bind(adjustment.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn mark_event_processed(
        &mut self,
        event_id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, processed_at)
            VALUES ($1, $2)
            "#,
        )
        .bind(event_id)
        .bind(processed_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
