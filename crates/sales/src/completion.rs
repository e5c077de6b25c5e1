//! Sale completion: state machine guards, authoritative totals, and the
//! integration event payload.
//!
//! Totals are recomputed from lines at completion time rather than trusted
//! from whatever a previous update call persisted. Any line violating its own
//! invariant aborts completion before any state changes.

use rust_decimal::Decimal;

use tableshop_contracts::{MoneyDto, SaleCompletedEvent, SaleCompletedLine};
use tableshop_core::{DomainError, DomainResult, checked_minor_sum, to_minor};

use crate::order::{SaleStatus, SalesOrder, SalesOrderLine};

/// Authoritative totals for a sale, all in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleTotals {
    pub subtotal_minor: i64,
    pub discount_total_minor: i64,
    pub tax_total_minor: i64,
    pub total_minor: i64,
}

/// Compute one line's subtotal, enforcing the line invariants.
///
/// `gross = round(quantity * unit price)`, rounded half away from zero to
/// whole minor units; `subtotal = gross - discount`.
pub fn line_subtotal_minor(line: &SalesOrderLine) -> DomainResult<i64> {
    if !line.quantity.is_positive() {
        return Err(DomainError::validation(
            "line quantity must be greater than 0",
        ));
    }

    if line.unit_sold_price_minor < 0 {
        return Err(DomainError::validation(
            "line unitSoldPriceMinor must be greater than or equal to 0",
        ));
    }

    if line.discount_minor < 0 {
        return Err(DomainError::validation(
            "line discountMinor must be greater than or equal to 0",
        ));
    }

    let gross_minor = to_minor(
        line.quantity.into_inner() * Decimal::from(line.unit_sold_price_minor),
    )?;

    if line.discount_minor > gross_minor {
        return Err(DomainError::validation(
            "line discountMinor cannot exceed line gross amount",
        ));
    }

    Ok(gross_minor - line.discount_minor)
}

/// Recompute sale totals from lines.
///
/// Tax is currently always zero, so the grand total equals the subtotal.
pub fn recompute_totals(lines: &[SalesOrderLine]) -> DomainResult<SaleTotals> {
    let mut subtotals = Vec::with_capacity(lines.len());
    for line in lines {
        subtotals.push(line_subtotal_minor(line)?);
    }

    let subtotal_minor = checked_minor_sum(subtotals)?;
    let discount_total_minor = checked_minor_sum(lines.iter().map(|l| l.discount_minor))?;

    Ok(SaleTotals {
        subtotal_minor,
        discount_total_minor,
        tax_total_minor: 0,
        total_minor: subtotal_minor,
    })
}

/// Guard the `Draft -> Completed` transition.
pub fn ensure_completable(sale: &SalesOrder, lines: &[SalesOrderLine]) -> DomainResult<()> {
    if sale.status != SaleStatus::Draft {
        return Err(DomainError::conflict("only draft sales can be completed"));
    }

    if lines.is_empty() {
        return Err(DomainError::validation(
            "sale must contain at least one line before completion",
        ));
    }

    Ok(())
}

/// Guard the `Draft -> Voided` transition.
pub fn ensure_voidable(sale: &SalesOrder) -> DomainResult<()> {
    if sale.status != SaleStatus::Draft {
        return Err(DomainError::conflict("only draft sales can be voided"));
    }

    Ok(())
}

/// Build the sale-completed integration payload from a sale and its lines.
///
/// Lines missing a true-value price fall back to the sold price.
pub fn build_completed_event(
    sale: &SalesOrder,
    lines: &[SalesOrderLine],
    totals: SaleTotals,
    currency_code: &str,
) -> SaleCompletedEvent {
    SaleCompletedEvent {
        sale_id: (*sale.sale_id.as_uuid()),
        campaign_id: (*sale.campaign_id.as_uuid()),
        sold_world_day: sale.sold_world_day.value(),
        storage_location_id: (*sale.storage_location_id.as_uuid()),
        customer_id: sale.customer_id.map(|c| *c.as_uuid()),
        total: MoneyDto::new(totals.total_minor, currency_code),
        tax_total: MoneyDto::new(totals.tax_total_minor, currency_code),
        lines: lines
            .iter()
            .map(|line| SaleCompletedLine {
                item_id: *line.item_id.as_uuid(),
                quantity: line.quantity,
                unit_sold_price: MoneyDto::new(line.unit_sold_price_minor, currency_code),
                unit_true_value: MoneyDto::new(
                    line.unit_true_value_minor
                        .unwrap_or(line.unit_sold_price_minor),
                    currency_code,
                ),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use tableshop_core::{
        CampaignId, ItemId, Quantity, SaleId, SaleLineId, StorageLocationId, UserId, WorldDay,
    };

    fn draft_sale() -> SalesOrder {
        SalesOrder::draft(
            SaleId::new(),
            CampaignId::new(),
            StorageLocationId::new(),
            WorldDay::new(10).unwrap(),
            None,
            None,
            UserId::new(),
            Utc::now(),
        )
    }

    fn line(sale_id: SaleId, quantity: i64, price: i64, discount: i64) -> SalesOrderLine {
        SalesOrderLine {
            sale_line_id: SaleLineId::new(),
            sale_id,
            item_id: ItemId::new(),
            quantity: Quantity::from_i64(quantity),
            unit_sold_price_minor: price,
            unit_true_value_minor: None,
            discount_minor: discount,
            notes: None,
            line_subtotal_minor: 0,
        }
    }

    #[test]
    fn totals_are_recomputed_from_lines() {
        let sale = draft_sale();
        let lines = vec![line(sale.sale_id, 2, 500, 100), line(sale.sale_id, 1, 300, 0)];

        let totals = recompute_totals(&lines).unwrap();
        assert_eq!(totals.subtotal_minor, 1200); // 2*500-100 + 1*300
        assert_eq!(totals.discount_total_minor, 100);
        assert_eq!(totals.tax_total_minor, 0);
        assert_eq!(totals.total_minor, 1200);
    }

    #[test]
    fn fractional_quantity_gross_rounds_half_away_from_zero() {
        let sale = draft_sale();
        let mut l = line(sale.sale_id, 1, 333, 0);
        l.quantity = Quantity::new("1.5".parse().unwrap());

        // 1.5 * 333 = 499.5 -> 500
        assert_eq!(line_subtotal_minor(&l).unwrap(), 500);
    }

    #[test]
    fn discount_exceeding_gross_aborts_completion() {
        let sale = draft_sale();
        let lines = vec![line(sale.sale_id, 1, 100, 101)];

        let err = recompute_totals(&lines).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let sale = draft_sale();
        let lines = vec![line(sale.sale_id, 0, 100, 0)];
        assert!(recompute_totals(&lines).is_err());
    }

    #[test]
    fn completion_requires_draft_status_and_lines() {
        let mut sale = draft_sale();
        let lines = vec![line(sale.sale_id, 1, 100, 0)];

        assert!(ensure_completable(&sale, &lines).is_ok());
        assert!(matches!(
            ensure_completable(&sale, &[]).unwrap_err(),
            DomainError::Validation(_)
        ));

        sale.status = SaleStatus::Completed;
        assert!(matches!(
            ensure_completable(&sale, &lines).unwrap_err(),
            DomainError::Conflict(_)
        ));
    }

    #[test]
    fn voiding_requires_draft_status() {
        let mut sale = draft_sale();
        assert!(ensure_voidable(&sale).is_ok());

        sale.status = SaleStatus::Voided;
        assert!(matches!(
            ensure_voidable(&sale).unwrap_err(),
            DomainError::Conflict(_)
        ));
    }

    #[test]
    fn event_payload_carries_totals_lines_and_true_value_fallback() {
        let sale = draft_sale();
        let mut l1 = line(sale.sale_id, 2, 500, 100);
        l1.unit_true_value_minor = Some(650);
        let l2 = line(sale.sale_id, 1, 300, 0);
        let lines = vec![l1, l2];

        let totals = recompute_totals(&lines).unwrap();
        let event = build_completed_event(&sale, &lines, totals, "GSC");

        assert_eq!(event.total.amount_minor, 1200);
        assert_eq!(event.tax_total.amount_minor, 0);
        assert_eq!(event.lines.len(), 2);
        assert_eq!(event.lines[0].unit_true_value.amount_minor, 650);
        // No explicit true value: fall back to the sold price.
        assert_eq!(event.lines[1].unit_true_value.amount_minor, 300);
        assert_eq!(event.sold_world_day, 10);
    }

    proptest! {
        #[test]
        fn subtotal_never_exceeds_gross_and_discount_is_summed(
            quantity in 1i64..1_000,
            price in 0i64..10_000,
            discount_fraction in 0u8..=100,
        ) {
            let sale = draft_sale();
            let gross = quantity * price;
            let discount = gross * i64::from(discount_fraction) / 100;
            let l = line(sale.sale_id, quantity, price, discount);

            let totals = recompute_totals(std::slice::from_ref(&l)).unwrap();
            prop_assert_eq!(totals.subtotal_minor, gross - discount);
            prop_assert_eq!(totals.discount_total_minor, discount);
            prop_assert_eq!(totals.total_minor, totals.subtotal_minor);
        }
    }
}
