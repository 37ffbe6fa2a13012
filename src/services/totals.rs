//! Pure order total calculator.
//!
//! Rounding happens per line, to two decimal places, before summation, so
//! the order aggregates are exact sums of the amounts that appear on the
//! printed lines.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::errors::ServiceError;

const MONEY_DP: u32 = 2;

/// One requested line: what the customer wants at what unit price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// A priced line after tax application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTotals {
    pub lines: Vec<PricedLine>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp(MONEY_DP)
}

/// Computes per-line and order totals for the given tax rate and discount.
///
/// `total_amount` is clamped at zero when the discount exceeds the taxed
/// subtotal; a negative total is never produced.
pub fn calculate(
    lines: &[OrderLine],
    tax_rate: Decimal,
    discount_amount: Decimal,
) -> Result<OrderTotals, ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::ValidationError(
            "Order must contain at least one item".to_string(),
        ));
    }
    if tax_rate < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Tax rate must not be negative, got {}",
            tax_rate
        )));
    }
    if discount_amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Discount must not be negative, got {}",
            discount_amount
        )));
    }

    let mut priced = Vec::with_capacity(lines.len());
    let mut subtotal = Decimal::ZERO;
    let mut tax_total = Decimal::ZERO;

    for line in lines {
        if line.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for product {} must be positive, got {}",
                line.product_id, line.quantity
            )));
        }
        if line.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Unit price for product {} must not be negative, got {}",
                line.product_id, line.unit_price
            )));
        }

        let line_subtotal = round_money(Decimal::from(line.quantity) * line.unit_price);
        let line_tax = round_money(line_subtotal * tax_rate);
        let line_total = line_subtotal + line_tax;

        subtotal += line_subtotal;
        tax_total += line_tax;

        priced.push(PricedLine {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            subtotal: line_subtotal,
            tax_amount: line_tax,
            total: line_total,
        });
    }

    let total_amount = (subtotal + tax_total - discount_amount).max(Decimal::ZERO);

    Ok(OrderTotals {
        lines: priced,
        subtotal,
        tax_amount: tax_total,
        discount_amount,
        total_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn line(quantity: i32, unit_price: Decimal) -> OrderLine {
        OrderLine {
            product_id: Uuid::new_v4(),
            quantity,
            unit_price,
        }
    }

    #[test]
    fn two_line_order_with_discount() {
        // 2 x 100 + 1 x 50 at 19% tax, discount 10
        let totals = calculate(
            &[line(2, dec!(100)), line(1, dec!(50))],
            dec!(0.19),
            dec!(10),
        )
        .unwrap();

        assert_eq!(totals.subtotal, dec!(250.00));
        assert_eq!(totals.tax_amount, dec!(47.50));
        assert_eq!(totals.total_amount, dec!(287.50));
    }

    #[test]
    fn discount_larger_than_order_clamps_to_zero() {
        let totals = calculate(&[line(1, dec!(10))], dec!(0.19), dec!(500)).unwrap();
        assert_eq!(totals.total_amount, Decimal::ZERO);
    }

    #[test]
    fn zero_priced_lines_are_allowed() {
        let totals = calculate(&[line(3, dec!(0))], dec!(0.19), dec!(0)).unwrap();
        assert_eq!(totals.subtotal, Decimal::ZERO);
        assert_eq!(totals.total_amount, Decimal::ZERO);
    }

    #[test]
    fn empty_order_is_rejected() {
        assert_matches!(
            calculate(&[], dec!(0.19), dec!(0)),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        assert_matches!(
            calculate(&[line(0, dec!(10))], dec!(0.19), dec!(0)),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            calculate(&[line(-2, dec!(10))], dec!(0.19), dec!(0)),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn negative_price_discount_and_rate_are_rejected() {
        assert_matches!(
            calculate(&[line(1, dec!(-1))], dec!(0.19), dec!(0)),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            calculate(&[line(1, dec!(1))], dec!(0.19), dec!(-1)),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            calculate(&[line(1, dec!(1))], dec!(-0.19), dec!(0)),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn rounding_is_applied_per_line_before_summation() {
        // 3 x 0.333 rounds to 1.00 on the line, not 0.999 across the order
        let totals = calculate(&[line(3, dec!(0.333))], dec!(0), dec!(0)).unwrap();
        assert_eq!(totals.subtotal, dec!(1.00));
        assert_eq!(totals.lines[0].subtotal, dec!(1.00));
    }

    proptest! {
        #[test]
        fn totals_invariant_holds(
            quantities in proptest::collection::vec(1i32..50, 1..8),
            price_cents in 0u32..100_000,
            discount_cents in 0u32..500_000,
            rate_bp in 0u32..3_000,
        ) {
            let unit_price = Decimal::new(price_cents as i64, 2);
            let discount = Decimal::new(discount_cents as i64, 2);
            let tax_rate = Decimal::new(rate_bp as i64, 4);
            let lines: Vec<OrderLine> = quantities
                .into_iter()
                .map(|q| line(q, unit_price))
                .collect();

            let totals = calculate(&lines, tax_rate, discount).unwrap();

            // total == max(0, subtotal + tax - discount), and never negative
            let expected =
                (totals.subtotal + totals.tax_amount - totals.discount_amount).max(Decimal::ZERO);
            prop_assert_eq!(totals.total_amount, expected);
            prop_assert!(totals.total_amount >= Decimal::ZERO);

            // aggregates are exact sums of the rounded lines
            let line_subtotal: Decimal = totals.lines.iter().map(|l| l.subtotal).sum();
            let line_tax: Decimal = totals.lines.iter().map(|l| l.tax_amount).sum();
            prop_assert_eq!(totals.subtotal, line_subtotal);
            prop_assert_eq!(totals.tax_amount, line_tax);
        }
    }
}
