use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tableshop_core::{
    CampaignId, CustomerId, DomainError, ItemId, Quantity, SaleId, SaleLineId, StorageLocationId,
    UserId, WorldDay,
};

/// Sales order lifecycle.
///
/// `Draft` is the only mutable state; `Completed` and `Voided` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleStatus {
    Draft,
    Completed,
    Voided,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Draft => "Draft",
            SaleStatus::Completed => "Completed",
            SaleStatus::Voided => "Voided",
        }
    }
}

impl core::str::FromStr for SaleStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("draft") {
            Ok(SaleStatus::Draft)
        } else if s.eq_ignore_ascii_case("completed") {
            Ok(SaleStatus::Completed)
        } else if s.eq_ignore_ascii_case("voided") {
            Ok(SaleStatus::Voided)
        } else {
            Err(DomainError::validation(format!("unknown sale status: {s}")))
        }
    }
}

impl core::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sales order, owned exclusively by the sales service.
///
/// Totals carried here are authoritative only once the sale is `Completed`;
/// while `Draft` they mirror whatever the last update computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrder {
    pub sale_id: SaleId,
    pub campaign_id: CampaignId,
    pub status: SaleStatus,
    pub customer_id: Option<CustomerId>,
    pub storage_location_id: StorageLocationId,
    pub sold_world_day: WorldDay,
    pub subtotal_minor: i64,
    pub discount_total_minor: i64,
    pub tax_total_minor: i64,
    pub total_minor: i64,
    pub notes: Option<String>,
    pub created_by_user_id: UserId,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SalesOrder {
    /// Create a fresh draft sale with zeroed totals.
    pub fn draft(
        sale_id: SaleId,
        campaign_id: CampaignId,
        storage_location_id: StorageLocationId,
        sold_world_day: WorldDay,
        customer_id: Option<CustomerId>,
        notes: Option<String>,
        created_by_user_id: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            sale_id,
            campaign_id,
            status: SaleStatus::Draft,
            customer_id,
            storage_location_id,
            sold_world_day,
            subtotal_minor: 0,
            discount_total_minor: 0,
            tax_total_minor: 0,
            total_minor: 0,
            notes,
            created_by_user_id,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_draft(&self) -> bool {
        matches!(self.status, SaleStatus::Draft)
    }
}

/// One line on a sales order.
///
/// Invariant: `line_subtotal_minor = round(quantity * unit_sold_price_minor)
/// - discount_minor`, with discount never exceeding the gross amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderLine {
    pub sale_line_id: SaleLineId,
    pub sale_id: SaleId,
    pub item_id: ItemId,
    pub quantity: Quantity,
    pub unit_sold_price_minor: i64,
    /// Reporting-only "true value" price; not charged.
    pub unit_true_value_minor: Option<i64>,
    pub discount_minor: i64,
    pub notes: Option<String>,
    pub line_subtotal_minor: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("draft".parse::<SaleStatus>().unwrap(), SaleStatus::Draft);
        assert_eq!(
            "COMPLETED".parse::<SaleStatus>().unwrap(),
            SaleStatus::Completed
        );
        assert!("archived".parse::<SaleStatus>().is_err());
    }

    #[test]
    fn draft_sale_starts_with_zero_totals() {
        let sale = SalesOrder::draft(
            SaleId::new(),
            CampaignId::new(),
            StorageLocationId::new(),
            WorldDay::new(10).unwrap(),
            None,
            None,
            UserId::new(),
            Utc::now(),
        );

        assert!(sale.is_draft());
        assert_eq!(sale.total_minor, 0);
        assert!(sale.completed_at.is_none());
    }
}
