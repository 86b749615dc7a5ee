//! Pricing of a cart: a pure function of its line items. All amounts are
//! i64 minor units (cents). Nothing here is persisted as authoritative —
//! the conversion engine recomputes once more inside its transaction and
//! stores that result on the order.

use crate::models::{CartItem, Totals};

pub const TAX_RATE_PERCENT: i64 = 10;
/// Above this taxable amount (cents) shipping is free.
pub const FREE_SHIPPING_THRESHOLD: i64 = 5_000;
pub const FLAT_SHIPPING_FEE: i64 = 599;

/// Derive the totals for a set of cart lines. Saved-for-later items do not
/// count. `discount` is supplied by the caller (coupon logic lives outside
/// this crate) and is clamped to what the subtotal can absorb.
pub fn compute_totals(items: &[CartItem], discount: i64) -> Totals {
    let subtotal: i64 = items
        .iter()
        .filter(|item| !item.saved_for_later)
        .map(|item| item.unit_price * item.quantity as i64)
        .sum();

    if subtotal == 0 {
        // Nothing priced in: no tax, and nothing to ship.
        return Totals {
            subtotal: 0,
            discount: 0,
            tax: 0,
            shipping: 0,
            grand_total: 0,
        };
    }

    let discount = discount.clamp(0, subtotal);
    let taxable = subtotal - discount;
    let tax = taxable * TAX_RATE_PERCENT / 100;
    let shipping = if taxable > FREE_SHIPPING_THRESHOLD {
        0
    } else {
        FLAT_SHIPPING_FEE
    };

    Totals {
        subtotal,
        discount,
        tax,
        shipping,
        grand_total: taxable + tax + shipping,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn item(quantity: i32, unit_price: i64, saved_for_later: bool) -> CartItem {
        CartItem {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity,
            unit_price,
            saved_for_later,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_cart_prices_to_zero() {
        assert_eq!(
            compute_totals(&[], 0),
            Totals {
                subtotal: 0,
                discount: 0,
                tax: 0,
                shipping: 0,
                grand_total: 0
            }
        );
    }

    #[test]
    fn flat_shipping_below_threshold() {
        // 3 x 10.00 = 30.00, tax 3.00, shipping 5.99
        let totals = compute_totals(&[item(3, 1_000, false)], 0);
        assert_eq!(totals.subtotal, 3_000);
        assert_eq!(totals.tax, 300);
        assert_eq!(totals.shipping, FLAT_SHIPPING_FEE);
        assert_eq!(totals.grand_total, 3_899);
    }

    #[test]
    fn free_shipping_above_threshold() {
        let totals = compute_totals(&[item(6, 1_000, false)], 0);
        assert_eq!(totals.subtotal, 6_000);
        assert_eq!(totals.shipping, 0);
        assert_eq!(totals.grand_total, 6_600);
    }

    #[test]
    fn threshold_is_exclusive() {
        // Exactly 50.00 taxable still pays the flat fee.
        let totals = compute_totals(&[item(5, 1_000, false)], 0);
        assert_eq!(totals.subtotal, FREE_SHIPPING_THRESHOLD);
        assert_eq!(totals.shipping, FLAT_SHIPPING_FEE);
    }

    #[test]
    fn discount_reduces_taxable_and_can_drop_free_shipping() {
        // 60.00 - 20.00 = 40.00 taxable: taxed at 10%, shipping due again.
        let totals = compute_totals(&[item(6, 1_000, false)], 2_000);
        assert_eq!(totals.discount, 2_000);
        assert_eq!(totals.tax, 400);
        assert_eq!(totals.shipping, FLAT_SHIPPING_FEE);
        assert_eq!(totals.grand_total, 4_000 + 400 + FLAT_SHIPPING_FEE);
    }

    #[test]
    fn discount_is_clamped_to_subtotal() {
        let totals = compute_totals(&[item(1, 1_000, false)], 99_999);
        assert_eq!(totals.discount, 1_000);
        assert_eq!(totals.tax, 0);
        assert_eq!(totals.grand_total, FLAT_SHIPPING_FEE);
    }

    #[test]
    fn saved_for_later_items_do_not_count() {
        let totals = compute_totals(&[item(2, 1_000, false), item(100, 9_999, true)], 0);
        assert_eq!(totals.subtotal, 2_000);
    }

    #[test]
    fn totals_reconcile_with_line_subtotals() {
        let items = [item(2, 1_250, false), item(1, 333, false)];
        let totals = compute_totals(&items, 100);
        let line_sum: i64 = items
            .iter()
            .map(|i| i.unit_price * i.quantity as i64)
            .sum();
        assert_eq!(
            totals.grand_total,
            line_sum - totals.discount + totals.tax + totals.shipping
        );
    }
}
