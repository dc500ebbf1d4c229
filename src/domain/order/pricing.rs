use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::models::CartLine;

// ============================================================================
// Checkout Pricing
// ============================================================================

/// Storefront pricing knobs applied at checkout.
///
/// Defaults: free shipping from 99 currency units, otherwise a 9.99 flat
/// fee, and an 8% tax rate on the subtotal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_fee: Decimal,
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Decimal::from(99),
            flat_shipping_fee: Decimal::new(999, 2),
            tax_rate: Decimal::new(8, 2),
        }
    }
}

/// The computed monetary breakdown of an order.
///
/// `total` is the sum of the other three by construction, and the order keeps
/// these exact values for life; nothing recomputes them after persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    /// Prices a cart: subtotal over line totals (unit price x quantity minus
    /// any per-line discount), threshold-based shipping, tax rounded to two
    /// decimal places.
    pub fn compute(policy: &PricingPolicy, lines: &[CartLine]) -> Self {
        let subtotal = lines.iter().fold(Decimal::ZERO, |acc, line| {
            let gross = line.unit_price * Decimal::from(line.quantity);
            acc + gross - line.discount.unwrap_or(Decimal::ZERO)
        });

        let shipping = if subtotal >= policy.free_shipping_threshold {
            Decimal::ZERO
        } else {
            policy.flat_shipping_fee
        };

        let tax = (subtotal * policy.tax_rate).round_dp(2);
        let total = subtotal + shipping + tax;

        Self {
            subtotal,
            shipping,
            tax,
            total,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn line(unit_price: Decimal, quantity: i32) -> CartLine {
        CartLine {
            product_id: Uuid::new_v4(),
            quantity,
            unit_price,
            discount: None,
        }
    }

    #[test]
    fn test_reference_cart_pricing() {
        // 2 x 25.00 below the free-shipping threshold.
        let totals = OrderTotals::compute(&PricingPolicy::default(), &[line(Decimal::new(2500, 2), 2)]);

        assert_eq!(totals.subtotal, Decimal::new(5000, 2));
        assert_eq!(totals.shipping, Decimal::new(999, 2));
        assert_eq!(totals.tax, Decimal::new(400, 2));
        assert_eq!(totals.total, Decimal::new(6399, 2));
    }

    #[test]
    fn test_total_is_sum_of_parts() {
        let carts = [
            vec![line(Decimal::new(2500, 2), 2)],
            vec![line(Decimal::new(9900, 2), 1)],
            vec![line(Decimal::new(1999, 2), 3), line(Decimal::new(499, 2), 1)],
        ];

        for lines in &carts {
            let totals = OrderTotals::compute(&PricingPolicy::default(), lines);
            assert_eq!(totals.total, totals.subtotal + totals.shipping + totals.tax);
        }
    }

    #[test]
    fn test_free_shipping_at_exact_threshold() {
        let totals = OrderTotals::compute(&PricingPolicy::default(), &[line(Decimal::new(9900, 2), 1)]);
        assert_eq!(totals.shipping, Decimal::ZERO);
    }

    #[test]
    fn test_flat_fee_just_below_threshold() {
        let totals = OrderTotals::compute(&PricingPolicy::default(), &[line(Decimal::new(9899, 2), 1)]);
        assert_eq!(totals.shipping, Decimal::new(999, 2));
    }

    #[test]
    fn test_discount_reduces_subtotal_before_shipping_and_tax() {
        let discounted = CartLine {
            product_id: Uuid::new_v4(),
            quantity: 1,
            unit_price: Decimal::from(100),
            discount: Some(Decimal::from(10)),
        };

        let totals = OrderTotals::compute(&PricingPolicy::default(), &[discounted]);
        assert_eq!(totals.subtotal, Decimal::from(90));
        // 90 < 99, so the flat fee applies again.
        assert_eq!(totals.shipping, Decimal::new(999, 2));
        assert_eq!(totals.tax, Decimal::new(720, 2));
    }

    #[test]
    fn test_tax_rounds_to_cents() {
        // 3 x 3.33 = 9.99; 8% = 0.7992 -> 0.80.
        let totals = OrderTotals::compute(&PricingPolicy::default(), &[line(Decimal::new(333, 2), 3)]);
        assert_eq!(totals.tax, Decimal::new(80, 2));
    }
}
