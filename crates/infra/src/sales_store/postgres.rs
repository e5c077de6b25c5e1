//! Postgres-backed sales store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use tableshop_core::{CampaignId, CustomerId, ItemId, Quantity, SaleId, SaleLineId, StorageLocationId, UserId, WorldDay};
use tableshop_sales::{SaleStatus, SalesOrder, SalesOrderLine};

use crate::error::StoreError;

use super::{OutboxMessage, SaleFilter, SalesSession, SalesStore};

/// Sales-service persistence over a sqlx Postgres pool.
#[derive(Debug, Clone)]
pub struct PgSalesStore {
    pool: PgPool,
}

impl PgSalesStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the sales-service tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS sales_orders (
                sale_id UUID PRIMARY KEY,
                campaign_id UUID NOT NULL,
                status TEXT NOT NULL,
                customer_id UUID NULL,
                storage_location_id UUID NOT NULL,
                sold_world_day INTEGER NOT NULL CHECK (sold_world_day >= 0),
                subtotal_minor BIGINT NOT NULL,
                discount_total_minor BIGINT NOT NULL,
                tax_total_minor BIGINT NOT NULL,
                total_minor BIGINT NOT NULL,
                notes TEXT NULL,
                created_by_user_id UUID NOT NULL,
                completed_at TIMESTAMPTZ NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS ix_sales_orders_campaign_day
                ON sales_orders (campaign_id, sold_world_day DESC, created_at DESC)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sales_order_lines (
                sale_line_id UUID PRIMARY KEY,
                sale_id UUID NOT NULL REFERENCES sales_orders (sale_id) ON DELETE CASCADE,
                item_id UUID NOT NULL,
                quantity NUMERIC(12,3) NOT NULL,
                unit_sold_price_minor BIGINT NOT NULL,
                unit_true_value_minor BIGINT NULL,
                discount_minor BIGINT NOT NULL,
                notes TEXT NULL,
                line_subtotal_minor BIGINT NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS ix_sales_order_lines_sale
                ON sales_order_lines (sale_id)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS outbox_messages (
                outbox_message_id UUID PRIMARY KEY,
                occurred_at TIMESTAMPTZ NOT NULL,
                event_type TEXT NOT NULL,
                aggregate_id UUID NOT NULL,
                campaign_id UUID NOT NULL,
                correlation_id UUID NOT NULL,
                payload_json TEXT NOT NULL,
                published_at TIMESTAMPTZ NULL,
                publish_attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS ix_outbox_messages_unpublished
                ON outbox_messages (occurred_at)
                WHERE published_at IS NULL
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}

fn map_sale_row(row: &PgRow) -> Result<SalesOrder, StoreError> {
    let status: String = row.try_get("status")?;
    let status: SaleStatus = status
        .parse()
        .map_err(|e| StoreError::Database(format!("invalid sale status in row: {e}")))?;

    Ok(SalesOrder {
        sale_id: SaleId::from_uuid(row.try_get("sale_id")?),
        campaign_id: CampaignId::from_uuid(row.try_get("campaign_id")?),
        status,
        customer_id: row
            .try_get::<Option<Uuid>, _>("customer_id")?
            .map(CustomerId::from_uuid),
        storage_location_id: StorageLocationId::from_uuid(row.try_get("storage_location_id")?),
        sold_world_day: WorldDay::clamped(row.try_get("sold_world_day")?),
        subtotal_minor: row.try_get("subtotal_minor")?,
        discount_total_minor: row.try_get("discount_total_minor")?,
        tax_total_minor: row.try_get("tax_total_minor")?,
        total_minor: row.try_get("total_minor")?,
        notes: row.try_get("notes")?,
        created_by_user_id: UserId::from_uuid(row.try_get("created_by_user_id")?),
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_line_row(row: &PgRow) -> Result<SalesOrderLine, StoreError> {
    Ok(SalesOrderLine {
        sale_line_id: SaleLineId::from_uuid(row.try_get("sale_line_id")?),
        sale_id: SaleId::from_uuid(row.try_get("sale_id")?),
        item_id: ItemId::from_uuid(row.try_get("item_id")?),
        quantity: Quantity::new(row.try_get("quantity")?),
        unit_sold_price_minor: row.try_get("unit_sold_price_minor")?,
        unit_true_value_minor: row.try_get("unit_true_value_minor")?,
        discount_minor: row.try_get("discount_minor")?,
        notes: row.try_get("notes")?,
        line_subtotal_minor: row.try_get("line_subtotal_minor")?,
    })
}

fn map_outbox_row(row: &PgRow) -> Result<OutboxMessage, StoreError> {
    Ok(OutboxMessage {
        outbox_message_id: row.try_get("outbox_message_id")?,
        occurred_at: row.try_get("occurred_at")?,
        event_type: row.try_get("event_type")?,
        aggregate_id: SaleId::from_uuid(row.try_get("aggregate_id")?),
        campaign_id: CampaignId::from_uuid(row.try_get("campaign_id")?),
        correlation_id: row.try_get("correlation_id")?,
        payload_json: row.try_get("payload_json")?,
        published_at: row.try_get("published_at")?,
        publish_attempts: row.try_get("publish_attempts")?,
        last_error: row.try_get("last_error")?,
    })
}

const SALE_COLUMNS: &str = r#"
    sale_id, campaign_id, status, customer_id, storage_location_id,
    sold_world_day, subtotal_minor, discount_total_minor, tax_total_minor,
    total_minor, notes, created_by_user_id, completed_at, created_at, updated_at
"#;

const LINE_COLUMNS: &str = r#"
    sale_line_id, sale_id, item_id, quantity, unit_sold_price_minor,
    unit_true_value_minor, discount_minor, notes, line_subtotal_minor
"#;

#[async_trait]
impl SalesStore for PgSalesStore {
    type Session = PgSalesSession;

    async fn begin(&self) -> Result<Self::Session, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgSalesSession { tx })
    }

    async fn insert_sale(&self, sale: &SalesOrder) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sales_orders (
                sale_id, campaign_id, status, customer_id, storage_location_id,
                sold_world_day, subtotal_minor, discount_total_minor,
                tax_total_minor, total_minor, notes, created_by_user_id,
                completed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(sale.sale_id.as_uuid())
        .bind(sale.campaign_id.as_uuid())
        .bind(sale.status.as_str())
        .bind(sale.customer_id.map(|c| *c.as_uuid()))
        .bind(sale.storage_location_id.as_uuid())
        .bind(sale.sold_world_day.value())
        .bind(sale.subtotal_minor)
        .bind(sale.discount_total_minor)
        .bind(sale.tax_total_minor)
        .bind(sale.total_minor)
        .bind(sale.notes.as_deref())
        .bind(sale.created_by_user_id.as_uuid())
        .bind(sale.completed_at)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn sale(
        &self,
        campaign_id: CampaignId,
        sale_id: SaleId,
    ) -> Result<Option<SalesOrder>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SALE_COLUMNS} FROM sales_orders WHERE campaign_id = $1 AND sale_id = $2"
        ))
        .bind(campaign_id.as_uuid())
        .bind(sale_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_sale_row).transpose()
    }

    async fn sale_lines(&self, sale_id: SaleId) -> Result<Vec<SalesOrderLine>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM sales_order_lines WHERE sale_id = $1 ORDER BY sale_line_id"
        ))
        .bind(sale_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_line_row).collect()
    }

    async fn list_sales(
        &self,
        campaign_id: CampaignId,
        filter: &SaleFilter,
    ) -> Result<Vec<SalesOrder>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SALE_COLUMNS}
            FROM sales_orders
            WHERE campaign_id = $1
              AND ($2::int IS NULL OR sold_world_day >= $2)
              AND ($3::int IS NULL OR sold_world_day <= $3)
              AND ($4::uuid IS NULL OR customer_id = $4)
            ORDER BY sold_world_day DESC, created_at DESC
            "#
        ))
        .bind(campaign_id.as_uuid())
        .bind(filter.from_world_day.map(|d| d.value()))
        .bind(filter.to_world_day.map(|d| d.value()))
        .bind(filter.customer_id.map(|c| *c.as_uuid()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_sale_row).collect()
    }

    async fn unpublished_messages(&self, limit: i64) -> Result<Vec<OutboxMessage>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT outbox_message_id, occurred_at, event_type, aggregate_id,
                   campaign_id, correlation_id, payload_json, published_at,
                   publish_attempts, last_error
            FROM outbox_messages
            WHERE published_at IS NULL
            ORDER BY occurred_at
            LIMIT $1
            "#,
        )
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_outbox_row).collect()
    }

    async fn mark_published(
        &self,
        outbox_message_id: Uuid,
        published_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE outbox_messages
            SET published_at = $2, last_error = NULL
            WHERE outbox_message_id = $1
            "#,
        )
        .bind(outbox_message_id)
        .bind(published_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_publish_failure(
        &self,
        outbox_message_id: Uuid,
        error: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE outbox_messages
            SET publish_attempts = publish_attempts + 1, last_error = $2
            WHERE outbox_message_id = $1
            "#,
        )
        .bind(outbox_message_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// One sales-service unit of work over a Postgres transaction.
pub struct PgSalesSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SalesSession for PgSalesSession {
    async fn sale_for_update(
        &mut self,
        campaign_id: CampaignId,
        sale_id: SaleId,
    ) -> Result<Option<SalesOrder>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {SALE_COLUMNS} FROM sales_orders
            WHERE campaign_id = $1 AND sale_id = $2
            FOR UPDATE
            "#
        ))
        .bind(campaign_id.as_uuid())
        .bind(sale_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(map_sale_row).transpose()
    }

    async fn sale_lines(&mut self, sale_id: SaleId) -> Result<Vec<SalesOrderLine>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM sales_order_lines WHERE sale_id = $1 ORDER BY sale_line_id"
        ))
        .bind(sale_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(map_line_row).collect()
    }

    async fn replace_lines(
        &mut self,
        sale_id: SaleId,
        lines: &[SalesOrderLine],
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sales_order_lines WHERE sale_id = $1")
            .bind(sale_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO sales_order_lines (
                    sale_line_id, sale_id, item_id, quantity,
                    unit_sold_price_minor, unit_true_value_minor,
                    discount_minor, notes, line_subtotal_minor
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(line.sale_line_id.as_uuid())
            .bind(line.sale_id.as_uuid())
            .bind(line.item_id.as_uuid())
            .bind(line.quantity.into_inner())
            .bind(line.unit_sold_price_minor)
            .bind(line.unit_true_value_minor)
            .bind(line.discount_minor)
            .bind(line.notes.as_deref())
            .bind(line.line_subtotal_minor)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn update_sale(&mut self, sale: &SalesOrder) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE sales_orders
            SET status = $3, customer_id = $4, storage_location_id = $5,
                sold_world_day = $6, subtotal_minor = $7,
                discount_total_minor = $8, tax_total_minor = $9,
                total_minor = $10, notes = $11, completed_at = $12,
                updated_at = $13
            WHERE campaign_id = $1 AND sale_id = $2
            "#,
        )
        .bind(sale.campaign_id.as_uuid())
        .bind(sale.sale_id.as_uuid())
        .bind(sale.status.as_str())
        .bind(sale.customer_id.map(|c| *c.as_uuid()))
        .bind(sale.storage_location_id.as_uuid())
        .bind(sale.sold_world_day.value())
        .bind(sale.subtotal_minor)
        .bind(sale.discount_total_minor)
        .bind(sale.tax_total_minor)
        .bind(sale.total_minor)
        .bind(sale.notes.as_deref())
        .bind(sale.completed_at)
        .bind(sale.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_outbox_message(&mut self, message: &OutboxMessage) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO outbox_messages (
                outbox_message_id, occurred_at, event_type, aggregate_id,
                campaign_id, correlation_id, payload_json, published_at,
                publish_attempts, last_error
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(message.outbox_message_id)
        .bind(message.occurred_at)
        .bind(&message.event_type)
        .bind(message.aggregate_id.as_uuid())
        .bind(message.campaign_id.as_uuid())
        .bind(message.correlation_id)
        .bind(&message.payload_json)
        .bind(message.published_at)
        .bind(message.publish_attempts)
        .bind(message.last_error.as_deref())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
