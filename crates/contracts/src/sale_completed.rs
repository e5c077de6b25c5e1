//! Sale-completed integration event.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tableshop_core::Quantity;

use crate::money::MoneyDto;

/// Stable event-type string for the v1 sale-completed event. Doubles as the
/// broker routing key.
pub const SALE_COMPLETED_V1: &str = "sales.sale_completed.v1";

/// Emitted when a draft sale is completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleCompletedEvent {
    #[serde(default)]
    pub sale_id: Uuid,

    #[serde(default)]
    pub campaign_id: Uuid,

    #[serde(default)]
    pub sold_world_day: i32,

    #[serde(default)]
    pub storage_location_id: Uuid,

    #[serde(default)]
    pub customer_id: Option<Uuid>,

    pub total: MoneyDto,

    pub tax_total: MoneyDto,

    #[serde(default)]
    pub lines: Vec<SaleCompletedLine>,
}

/// One sold item line on a completed sale event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleCompletedLine {
    #[serde(default)]
    pub item_id: Uuid,

    #[serde(default)]
    pub quantity: Quantity,

    pub unit_sold_price: MoneyDto,

    pub unit_true_value: MoneyDto,
}
