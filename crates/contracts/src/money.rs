//! Monetary wire representation.

use serde::{Deserialize, Serialize};

/// A monetary value in minor currency units plus its currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyDto {
    /// Amount in minor units (e.g. copper pieces).
    #[serde(default)]
    pub amount_minor: i64,

    /// Currency code, e.g. "GSC" (gold standard coin).
    #[serde(default)]
    pub currency_code: String,
}

impl MoneyDto {
    pub fn new(amount_minor: i64, currency_code: impl Into<String>) -> Self {
        Self {
            amount_minor,
            currency_code: currency_code.into(),
        }
    }
}
