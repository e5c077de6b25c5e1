//! Sales-service operations: draft lifecycle, line replacement, completion,
//! voiding.
//!
//! Completion is the one operation with cross-service weight: the status
//! change, the recomputed totals, and the outbox row all commit in the same
//! session, so the sale-completed event exists if and only if the completion
//! itself does.

use chrono::Utc;
use uuid::Uuid;

use tableshop_contracts::{EventEnvelope, SALE_COMPLETED_V1};
use tableshop_core::{
    CampaignId, CustomerId, DomainError, ItemId, Quantity, SaleId, SaleLineId, StorageLocationId,
    UserId, WorldDay,
};
use tableshop_sales::{
    SaleStatus, SalesOrder, SalesOrderLine, build_completed_event, ensure_completable,
    ensure_voidable, line_subtotal_minor, recompute_totals,
};

use crate::sales_store::{OutboxMessage, SalesSession, SalesStore};

use super::ServiceError;

#[derive(Debug, Clone)]
pub struct CreateSaleCommand {
    pub campaign_id: CampaignId,
    pub storage_location_id: StorageLocationId,
    pub sold_world_day: WorldDay,
    pub customer_id: Option<CustomerId>,
    pub notes: Option<String>,
    pub created_by_user_id: UserId,
}

/// Create a draft sale with zeroed totals.
pub async fn create_sale<S: SalesStore>(
    store: &S,
    command: CreateSaleCommand,
) -> Result<SaleId, ServiceError> {
    let sale = SalesOrder::draft(
        SaleId::new(),
        command.campaign_id,
        command.storage_location_id,
        command.sold_world_day,
        command.customer_id,
        command.notes,
        command.created_by_user_id,
        Utc::now(),
    );

    store.insert_sale(&sale).await?;
    Ok(sale.sale_id)
}

/// One requested line in an update, not yet validated.
#[derive(Debug, Clone)]
pub struct SaleLineInput {
    pub sale_line_id: Option<SaleLineId>,
    pub item_id: ItemId,
    pub quantity: Quantity,
    pub unit_sold_price_minor: i64,
    pub unit_true_value_minor: Option<i64>,
    pub discount_minor: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateSaleCommand {
    pub campaign_id: CampaignId,
    pub sale_id: SaleId,
    pub storage_location_id: StorageLocationId,
    pub sold_world_day: WorldDay,
    pub customer_id: Option<CustomerId>,
    pub notes: Option<String>,
    pub lines: Vec<SaleLineInput>,
}

/// Replace the lines (and header fields) of a draft sale, storing
/// provisional totals. Only draft sales are mutable.
pub async fn update_sale<S: SalesStore>(
    store: &S,
    command: UpdateSaleCommand,
) -> Result<(), ServiceError> {
    let mut session = store.begin().await?;

    let mut sale = session
        .sale_for_update(command.campaign_id, command.sale_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    if !sale.is_draft() {
        return Err(DomainError::conflict("only draft sales can be updated").into());
    }

    let mut lines = Vec::with_capacity(command.lines.len());
    for input in command.lines {
        let mut line = SalesOrderLine {
            sale_line_id: input.sale_line_id.unwrap_or_else(SaleLineId::new),
            sale_id: sale.sale_id,
            item_id: input.item_id,
            quantity: input.quantity,
            unit_sold_price_minor: input.unit_sold_price_minor,
            unit_true_value_minor: input.unit_true_value_minor,
            discount_minor: input.discount_minor,
            notes: input.notes,
            line_subtotal_minor: 0,
        };
        line.line_subtotal_minor = line_subtotal_minor(&line).map_err(ServiceError::Domain)?;
        lines.push(line);
    }

    let totals = recompute_totals(&lines).map_err(ServiceError::Domain)?;
    let now = Utc::now();

    sale.storage_location_id = command.storage_location_id;
    sale.sold_world_day = command.sold_world_day;
    sale.customer_id = command.customer_id;
    sale.notes = command.notes;
    sale.subtotal_minor = totals.subtotal_minor;
    sale.discount_total_minor = totals.discount_total_minor;
    sale.tax_total_minor = totals.tax_total_minor;
    sale.total_minor = totals.total_minor;
    sale.updated_at = now;

    session.replace_lines(sale.sale_id, &lines).await?;
    session.update_sale(&sale).await?;
    session.commit().await?;

    Ok(())
}

/// Complete a draft sale: recompute authoritative totals from lines,
/// transition to `Completed`, and record the outbox row in one transaction.
pub async fn complete_sale<S: SalesStore>(
    store: &S,
    campaign_id: CampaignId,
    sale_id: SaleId,
    correlation_id: Uuid,
    currency_code: &str,
) -> Result<SaleStatus, ServiceError> {
    let mut session = store.begin().await?;

    let mut sale = session
        .sale_for_update(campaign_id, sale_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    let lines = session.sale_lines(sale_id).await?;
    ensure_completable(&sale, &lines).map_err(ServiceError::Domain)?;

    let totals = recompute_totals(&lines).map_err(ServiceError::Domain)?;
    let now = Utc::now();

    sale.status = SaleStatus::Completed;
    sale.subtotal_minor = totals.subtotal_minor;
    sale.discount_total_minor = totals.discount_total_minor;
    sale.tax_total_minor = totals.tax_total_minor;
    sale.total_minor = totals.total_minor;
    sale.completed_at = Some(now);
    sale.updated_at = now;

    let event = build_completed_event(&sale, &lines, totals, currency_code);
    let envelope = EventEnvelope::new(
        SALE_COMPLETED_V1,
        now,
        *campaign_id.as_uuid(),
        correlation_id,
        event,
    );
    let payload_json =
        serde_json::to_string(&envelope).map_err(|e| ServiceError::Store(e.into()))?;

    let message = OutboxMessage::pending(
        now,
        SALE_COMPLETED_V1,
        sale_id,
        campaign_id,
        correlation_id,
        payload_json,
    );

    session.update_sale(&sale).await?;
    session.insert_outbox_message(&message).await?;
    session.commit().await?;

    Ok(SaleStatus::Completed)
}

/// Void a draft sale. Produces no event.
pub async fn void_sale<S: SalesStore>(
    store: &S,
    campaign_id: CampaignId,
    sale_id: SaleId,
) -> Result<SaleStatus, ServiceError> {
    let mut session = store.begin().await?;

    let mut sale = session
        .sale_for_update(campaign_id, sale_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    ensure_voidable(&sale).map_err(ServiceError::Domain)?;

    sale.status = SaleStatus::Voided;
    sale.updated_at = Utc::now();

    session.update_sale(&sale).await?;
    session.commit().await?;

    Ok(SaleStatus::Voided)
}
