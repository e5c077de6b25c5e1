//! Stock quantities with fixed 3-decimal precision.
//!
//! Every quantity in the system is normalized to 3 decimal places with
//! round-half-away-from-zero before comparison or storage. Normalizing at
//! each arithmetic step keeps repeated small consumptions from accumulating
//! fractional drift.

use core::ops::Neg;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};

/// Decimal places carried by every stored or compared quantity.
pub const QUANTITY_SCALE: u32 = 3;

/// A stock quantity, always normalized to [`QUANTITY_SCALE`] decimals.
///
/// Deserialization goes through [`Quantity::new`], so the normalization
/// invariant holds even for values arriving off the wire.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        <Decimal as Deserialize>::deserialize(deserializer).map(Quantity::new)
    }
}

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    /// Normalize an arbitrary decimal into a quantity.
    pub fn new(value: Decimal) -> Self {
        Self(value.round_dp_with_strategy(
            QUANTITY_SCALE,
            RoundingStrategy::MidpointAwayFromZero,
        ))
    }

    pub fn from_i64(value: i64) -> Self {
        Self::new(Decimal::from(value))
    }

    pub fn into_inner(self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(self) -> Self {
        Self::new(self.0.abs())
    }

    /// Sum, renormalized.
    pub fn add(self, other: Quantity) -> Self {
        Self::new(self.0 + other.0)
    }

    /// Difference, renormalized.
    pub fn sub(self, other: Quantity) -> Self {
        Self::new(self.0 - other.0)
    }

    pub fn min(self, other: Quantity) -> Self {
        if self.0 <= other.0 { self } else { other }
    }
}

impl Neg for Quantity {
    type Output = Quantity;

    fn neg(self) -> Self::Output {
        Quantity::new(-self.0)
    }
}

impl From<Decimal> for Quantity {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn normalizes_to_three_decimals_half_away_from_zero() {
        assert_eq!(Quantity::new(dec("1.2345")).into_inner(), dec("1.235"));
        assert_eq!(Quantity::new(dec("1.2344")).into_inner(), dec("1.234"));
        assert_eq!(Quantity::new(dec("-1.2345")).into_inner(), dec("-1.235"));
    }

    #[test]
    fn repeated_small_consumption_leaves_no_residue() {
        let step = Quantity::new(dec("0.1"));
        let mut on_hand = Quantity::new(dec("1.000"));
        for _ in 0..10 {
            on_hand = on_hand.sub(step);
        }
        assert_eq!(on_hand, Quantity::ZERO);
    }

    #[test]
    fn min_and_sign_helpers() {
        let a = Quantity::from_i64(2);
        let b = Quantity::from_i64(5);
        assert_eq!(a.min(b), a);
        assert!(b.is_positive());
        assert!((-b).is_negative());
        assert_eq!((-b).abs(), b);
    }
}
