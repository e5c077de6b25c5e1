use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tableshop_core::{
    AdjustmentId, CampaignId, DomainError, ItemId, LotId, Quantity, StorageLocationId, UserId,
    WorldDay,
};

/// Why a stock delta was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentReason {
    Restock,
    Sale,
    Damage,
    Theft,
    Spoilage,
    ManualCorrection,
}

impl AdjustmentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentReason::Restock => "Restock",
            AdjustmentReason::Sale => "Sale",
            AdjustmentReason::Damage => "Damage",
            AdjustmentReason::Theft => "Theft",
            AdjustmentReason::Spoilage => "Spoilage",
            AdjustmentReason::ManualCorrection => "ManualCorrection",
        }
    }
}

impl core::str::FromStr for AdjustmentReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        [
            AdjustmentReason::Restock,
            AdjustmentReason::Sale,
            AdjustmentReason::Damage,
            AdjustmentReason::Theft,
            AdjustmentReason::Spoilage,
            AdjustmentReason::ManualCorrection,
        ]
        .into_iter()
        .find(|reason| reason.as_str().eq_ignore_ascii_case(trimmed))
        .ok_or_else(|| DomainError::validation("reason is invalid"))
    }
}

impl core::fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form pointer back at whatever caused an adjustment (e.g. a sale).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentReference {
    pub reference_type: String,
    pub reference_id: uuid::Uuid,
}

impl AdjustmentReference {
    pub fn sale(sale_id: uuid::Uuid) -> Self {
        Self {
            reference_type: "Sale".to_string(),
            reference_id: sale_id,
        }
    }
}

/// One immutable audit-ledger row recording a signed stock delta.
///
/// `lot_id` is `None` only when the delta could not be tied to a specific lot
/// (an oversell correction). The sum of a lot's adjustments reconciles with
/// its current quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAdjustment {
    pub adjustment_id: AdjustmentId,
    pub campaign_id: CampaignId,
    pub item_id: ItemId,
    pub storage_location_id: StorageLocationId,
    pub lot_id: Option<LotId>,
    pub delta_quantity: Quantity,
    pub reason: AdjustmentReason,
    pub world_day: WorldDay,
    pub notes: Option<String>,
    pub reference: Option<AdjustmentReference>,
    pub created_by_user_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_parses_case_insensitively_with_whitespace() {
        assert_eq!(
            " restock ".parse::<AdjustmentReason>().unwrap(),
            AdjustmentReason::Restock
        );
        assert_eq!(
            "manualcorrection".parse::<AdjustmentReason>().unwrap(),
            AdjustmentReason::ManualCorrection
        );
        assert!("shrinkage".parse::<AdjustmentReason>().is_err());
    }
}
