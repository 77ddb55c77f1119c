use depot_core::error::{DomainError, DomainResult};
use rust_decimal::{Decimal, RoundingStrategy};

/// Priced amounts for one line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePricing {
    pub subtotal: Decimal,
    pub cost_price: Option<Decimal>,
    pub profit: Option<Decimal>,
}

/// Monetary amounts are kept at 2 decimals, rounding halves away from
/// zero.
fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Price one line: `subtotal = unit_price * quantity`, and when the
/// catalog knows the product's cost, `profit = (unit_price - cost_price)
/// * quantity`. Pure; the caller persists the result.
pub fn price_line(
    unit_price: Decimal,
    quantity: i32,
    cost_price: Option<Decimal>,
) -> DomainResult<LinePricing> {
    if unit_price <= Decimal::ZERO {
        return Err(DomainError::validation(
            "unit price must be greater than zero",
        ));
    }
    if quantity <= 0 {
        return Err(DomainError::validation(
            "quantity must be greater than zero",
        ));
    }
    if let Some(cost) = cost_price {
        if cost < Decimal::ZERO {
            return Err(DomainError::validation("cost price cannot be negative"));
        }
    }

    let qty = Decimal::from(quantity);
    let subtotal = round2(unit_price * qty);
    let profit = cost_price.map(|cost| round2((unit_price - cost) * qty));

    Ok(LinePricing {
        subtotal,
        cost_price,
        profit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn subtotal_without_cost() {
        let pricing = price_line(dec!(10.00), 2, None).unwrap();
        assert_eq!(pricing.subtotal, dec!(20.00));
        assert_eq!(pricing.cost_price, None);
        assert_eq!(pricing.profit, None);
    }

    #[test]
    fn subtotal_and_profit_with_cost() {
        let pricing = price_line(dec!(20.00), 3, Some(dec!(12.00))).unwrap();
        assert_eq!(pricing.subtotal, dec!(60.00));
        assert_eq!(pricing.cost_price, Some(dec!(12.00)));
        assert_eq!(pricing.profit, Some(dec!(24.00)));
    }

    #[test]
    fn negative_margin_yields_negative_profit() {
        let pricing = price_line(dec!(8.00), 2, Some(dec!(10.00))).unwrap();
        assert_eq!(pricing.profit, Some(dec!(-4.00)));
    }

    #[test]
    fn rounds_half_away_from_zero() {
        // 3.335 * 1 rounds up to 3.34, not banker's 3.34/3.33 ambiguity.
        let pricing = price_line(dec!(3.335), 1, None).unwrap();
        assert_eq!(pricing.subtotal, dec!(3.34));

        let pricing = price_line(dec!(0.105), 1, Some(dec!(0.00))).unwrap();
        assert_eq!(pricing.subtotal, dec!(0.11));
        assert_eq!(pricing.profit, Some(dec!(0.11)));
    }

    #[test]
    fn rejects_non_positive_price() {
        assert!(matches!(
            price_line(dec!(0.00), 1, None),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            price_line(dec!(-5.00), 1, None),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn rejects_non_positive_quantity() {
        assert!(matches!(
            price_line(dec!(10.00), 0, None),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            price_line(dec!(10.00), -3, None),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn rejects_negative_cost_price() {
        assert!(matches!(
            price_line(dec!(10.00), 1, Some(dec!(-1.00))),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn zero_cost_price_is_valid() {
        let pricing = price_line(dec!(5.00), 4, Some(dec!(0.00))).unwrap();
        assert_eq!(pricing.profit, Some(dec!(20.00)));
    }
}
