//! Minor-currency-unit arithmetic.
//!
//! Monetary amounts are carried as `i64` minor units (e.g. copper pieces).
//! Accumulation is always checked so corrupt or adversarial line data cannot
//! silently wrap totals.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{DomainError, DomainResult};

/// Round a decimal amount to whole minor units (half away from zero) and
/// convert to `i64`.
pub fn to_minor(amount: Decimal) -> DomainResult<i64> {
    amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| DomainError::validation("totals exceed supported range"))
}

/// Checked sum over minor-unit amounts.
pub fn checked_minor_sum(amounts: impl IntoIterator<Item = i64>) -> DomainResult<i64> {
    let mut total: i64 = 0;
    for amount in amounts {
        total = total
            .checked_add(amount)
            .ok_or_else(|| DomainError::validation("totals exceed supported range"))?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero_to_whole_units() {
        assert_eq!(to_minor(Decimal::new(15, 1)).unwrap(), 2); // 1.5
        assert_eq!(to_minor(Decimal::new(-15, 1)).unwrap(), -2); // -1.5
        assert_eq!(to_minor(Decimal::new(14, 1)).unwrap(), 1); // 1.4
    }

    #[test]
    fn checked_sum_detects_overflow() {
        let err = checked_minor_sum([i64::MAX, 1]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(checked_minor_sum([900, 300]).unwrap(), 1200);
    }
}
