//! Request/response DTOs (camelCase JSON) and shared field validation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tableshop_core::{Quantity, WorldDay};
use tableshop_inventory::{InventoryAdjustment, InventoryLot};
use tableshop_sales::{SalesOrder, SalesOrderLine};

// --- field validation helpers -------------------------------------------

/// Trim optional free text, dropping empty strings and bounding length.
pub fn normalize_text(
    value: Option<String>,
    max_len: usize,
    field: &str,
) -> Result<Option<String>, String> {
    let trimmed = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match trimmed {
        Some(v) if v.chars().count() > max_len => {
            Err(format!("{field} must be {max_len} characters or fewer"))
        }
        other => Ok(other),
    }
}

pub fn require_world_day(day: i32, field: &str) -> Result<WorldDay, String> {
    WorldDay::new(day).map_err(|_| format!("{field} must be greater than or equal to 0"))
}

pub fn require_id<T: From<Uuid>>(raw: Uuid, field: &str) -> Result<T, String> {
    if raw.is_nil() {
        return Err(format!("{field} is required"));
    }
    Ok(T::from(raw))
}

pub fn optional_id<T: From<Uuid>>(raw: Option<Uuid>, field: &str) -> Result<Option<T>, String> {
    match raw {
        Some(value) if value.is_nil() => {
            Err(format!("{field} must be a non-empty UUID when provided"))
        }
        Some(value) => Ok(Some(T::from(value))),
        None => Ok(None),
    }
}

// --- sales ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSaleRequest {
    pub sold_world_day: i32,
    pub storage_location_id: Uuid,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSaleResponse {
    pub sale_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSaleLineRequest {
    #[serde(default)]
    pub sale_line_id: Option<Uuid>,
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub unit_sold_price_minor: i64,
    #[serde(default)]
    pub unit_true_value_minor: Option<i64>,
    #[serde(default)]
    pub discount_minor: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSaleRequest {
    pub sold_world_day: i32,
    pub storage_location_id: Uuid,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub lines: Vec<UpdateSaleLineRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSaleResponse {
    pub updated: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidSaleRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleStatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleListItem {
    pub sale_id: Uuid,
    pub status: String,
    pub sold_world_day: i32,
    pub customer_id: Option<Uuid>,
    pub storage_location_id: Uuid,
    pub total_minor: i64,
}

impl From<&SalesOrder> for SaleListItem {
    fn from(sale: &SalesOrder) -> Self {
        Self {
            sale_id: *sale.sale_id.as_uuid(),
            status: sale.status.as_str().to_string(),
            sold_world_day: sale.sold_world_day.value(),
            customer_id: sale.customer_id.map(|c| *c.as_uuid()),
            storage_location_id: *sale.storage_location_id.as_uuid(),
            total_minor: sale.total_minor,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleTotalsDto {
    pub subtotal_minor: i64,
    pub discount_total_minor: i64,
    pub tax_total_minor: i64,
    pub total_minor: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLineDto {
    pub sale_line_id: Uuid,
    pub item_id: Uuid,
    pub quantity: Quantity,
    pub unit_sold_price_minor: i64,
    pub unit_true_value_minor: Option<i64>,
    pub discount_minor: i64,
    pub notes: Option<String>,
    pub line_subtotal_minor: i64,
}

impl From<&SalesOrderLine> for SaleLineDto {
    fn from(line: &SalesOrderLine) -> Self {
        Self {
            sale_line_id: *line.sale_line_id.as_uuid(),
            item_id: *line.item_id.as_uuid(),
            quantity: line.quantity,
            unit_sold_price_minor: line.unit_sold_price_minor,
            unit_true_value_minor: line.unit_true_value_minor,
            discount_minor: line.discount_minor,
            notes: line.notes.clone(),
            line_subtotal_minor: line.line_subtotal_minor,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleDetail {
    pub sale_id: Uuid,
    pub campaign_id: Uuid,
    pub status: String,
    pub sold_world_day: i32,
    pub customer_id: Option<Uuid>,
    pub storage_location_id: Uuid,
    pub notes: Option<String>,
    pub totals: SaleTotalsDto,
    pub lines: Vec<SaleLineDto>,
}

impl SaleDetail {
    pub fn from_parts(sale: &SalesOrder, lines: &[SalesOrderLine]) -> Self {
        Self {
            sale_id: *sale.sale_id.as_uuid(),
            campaign_id: *sale.campaign_id.as_uuid(),
            status: sale.status.as_str().to_string(),
            sold_world_day: sale.sold_world_day.value(),
            customer_id: sale.customer_id.map(|c| *c.as_uuid()),
            storage_location_id: *sale.storage_location_id.as_uuid(),
            notes: sale.notes.clone(),
            totals: SaleTotalsDto {
                subtotal_minor: sale.subtotal_minor,
                discount_total_minor: sale.discount_total_minor,
                tax_total_minor: sale.tax_total_minor,
                total_minor: sale.total_minor,
            },
            lines: lines.iter().map(SaleLineDto::from).collect(),
        }
    }
}

// --- inventory -----------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLotRequest {
    pub item_id: Uuid,
    pub storage_location_id: Uuid,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit_cost_minor: i64,
    pub acquired_world_day: i32,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLotResponse {
    pub lot_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotDto {
    pub lot_id: Uuid,
    pub item_id: Uuid,
    pub storage_location_id: Uuid,
    pub quantity_on_hand: Quantity,
    pub unit_cost_minor: i64,
    pub acquired_world_day: i32,
    pub source: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&InventoryLot> for LotDto {
    fn from(lot: &InventoryLot) -> Self {
        Self {
            lot_id: *lot.lot_id.as_uuid(),
            item_id: *lot.item_id.as_uuid(),
            storage_location_id: *lot.storage_location_id.as_uuid(),
            quantity_on_hand: lot.quantity_on_hand,
            unit_cost_minor: lot.unit_cost_minor,
            acquired_world_day: lot.acquired_world_day.value(),
            source: lot.source.clone(),
            notes: lot.notes.clone(),
            created_at: lot.created_at,
            updated_at: lot.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdjustmentRequest {
    pub item_id: Uuid,
    pub storage_location_id: Uuid,
    #[serde(default)]
    pub lot_id: Option<Uuid>,
    pub delta_quantity: Decimal,
    pub reason: String,
    pub world_day: i32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub reference_type: Option<String>,
    #[serde(default)]
    pub reference_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdjustmentResponse {
    pub adjustment_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentDto {
    pub adjustment_id: Uuid,
    pub item_id: Uuid,
    pub storage_location_id: Uuid,
    pub lot_id: Option<Uuid>,
    pub delta_quantity: Quantity,
    pub reason: String,
    pub world_day: i32,
    pub notes: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_by_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<&InventoryAdjustment> for AdjustmentDto {
    fn from(adjustment: &InventoryAdjustment) -> Self {
        Self {
            adjustment_id: *adjustment.adjustment_id.as_uuid(),
            item_id: *adjustment.item_id.as_uuid(),
            storage_location_id: *adjustment.storage_location_id.as_uuid(),
            lot_id: adjustment.lot_id.map(|l| *l.as_uuid()),
            delta_quantity: adjustment.delta_quantity,
            reason: adjustment.reason.as_str().to_string(),
            world_day: adjustment.world_day.value(),
            notes: adjustment.notes.clone(),
            reference_type: adjustment
                .reference
                .as_ref()
                .map(|r| r.reference_type.clone()),
            reference_id: adjustment.reference.as_ref().map(|r| r.reference_id),
            created_by_user_id: *adjustment.created_by_user_id.as_uuid(),
            created_at: adjustment.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRowDto {
    pub item_id: Uuid,
    pub storage_location_id: Uuid,
    pub quantity_on_hand: Quantity,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub rows: Vec<SummaryRowDto>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_trims_and_bounds() {
        assert_eq!(normalize_text(None, 10, "notes").unwrap(), None);
        assert_eq!(normalize_text(Some("   ".into()), 10, "notes").unwrap(), None);
        assert_eq!(
            normalize_text(Some("  hi  ".into()), 10, "notes").unwrap(),
            Some("hi".to_string())
        );
        assert!(normalize_text(Some("x".repeat(11)), 10, "notes").is_err());
    }

    #[test]
    fn id_helpers_reject_nil() {
        use tableshop_core::ItemId;

        assert!(require_id::<ItemId>(Uuid::nil(), "itemId").is_err());
        assert!(require_id::<ItemId>(Uuid::now_v7(), "itemId").is_ok());
        assert!(optional_id::<ItemId>(Some(Uuid::nil()), "itemId").is_err());
        assert_eq!(optional_id::<ItemId>(None, "itemId").unwrap(), None);
    }
}
