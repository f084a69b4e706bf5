//! Cart totals and coupon rules.
//!
//! These are the numbers a customer sees on the cart page and the numbers
//! written to an order at checkout, so both call the same functions.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::models::Coupon;
use crate::types::CouponType;

/// Subtotal, discount and total of a cart or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct Totals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl Totals {
    /// Compute totals for priced lines of `(unit_price, quantity)`.
    ///
    /// The discount is rounded to cents and never exceeds the subtotal, so
    /// `total` is never negative.
    #[must_use]
    pub fn compute<I>(lines: I, coupon: Option<&Coupon>) -> Self
    where
        I: IntoIterator<Item = (Decimal, i32)>,
    {
        let subtotal: Decimal = lines
            .into_iter()
            .map(|(unit_price, quantity)| line_subtotal(unit_price, quantity))
            .sum();
        let discount = coupon.map_or(Decimal::ZERO, |c| c.discount_on(subtotal));

        Self {
            subtotal,
            discount,
            total: subtotal - discount,
        }
    }
}

/// `unit_price * quantity`.
#[must_use]
pub fn line_subtotal(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Discount for a coupon of the given type and value on `subtotal`.
///
/// Percent coupons take `value`% of the subtotal; fixed coupons take `value`.
/// The result is rounded half away from zero to cents and capped at the
/// subtotal. Negative values never increase the price.
#[must_use]
pub fn discount_for(coupon_type: CouponType, value: Decimal, subtotal: Decimal) -> Decimal {
    let raw = match coupon_type {
        CouponType::Percent => subtotal * value / Decimal::ONE_HUNDRED,
        CouponType::Fixed => value,
    };
    round_money(raw).clamp(Decimal::ZERO, subtotal.max(Decimal::ZERO))
}

/// Round a money amount to two decimal places.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Format a money amount with space-grouped thousands and two decimals,
/// e.g. `1 250 000.00`.
#[must_use]
pub fn format_money(amount: Decimal) -> String {
    let rounded = round_money(amount);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-{grouped}.{cents}")
    } else {
        format!("{grouped}.{cents}")
    }
}

impl Coupon {
    /// Whether the coupon can be applied at `now`.
    ///
    /// A coupon is redeemable when it is active, `now` lies inside
    /// `[active_from, active_to]` and its usage limit (if any) has not been
    /// reached.
    #[must_use]
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.active_from <= now
            && now <= self.active_to
            && self
                .usage_limit
                .is_none_or(|limit| self.used_count < limit)
    }

    /// Discount this coupon gives on `subtotal`.
    #[must_use]
    pub fn discount_on(&self, subtotal: Decimal) -> Decimal {
        discount_for(self.coupon_type, self.value, subtotal)
    }

    /// Codes are matched case-insensitively, with full Unicode lowercasing
    /// like the `lower(code)` lookup in SQL.
    #[must_use]
    pub fn matches_code(&self, code: &str) -> bool {
        self.code.to_lowercase() == code.trim().to_lowercase()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::types::CouponId;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn coupon(coupon_type: CouponType, value: &str) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: CouponId::new(1),
            code: "BAHOR10".to_owned(),
            coupon_type,
            value: dec(value),
            active_from: now - Duration::days(1),
            active_to: now + Duration::days(1),
            usage_limit: None,
            used_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_empty_cart_totals_are_zero() {
        let totals = Totals::compute(Vec::new(), None);
        assert_eq!(totals, Totals::default());
    }

    #[test]
    fn test_totals_without_coupon() {
        let totals = Totals::compute([(dec("19.99"), 2), (dec("5.00"), 1)], None);
        assert_eq!(totals.subtotal, dec("44.98"));
        assert_eq!(totals.discount, Decimal::ZERO);
        assert_eq!(totals.total, dec("44.98"));
    }

    #[test]
    fn test_percent_coupon() {
        let c = coupon(CouponType::Percent, "10");
        let totals = Totals::compute([(dec("100.00"), 2)], Some(&c));
        assert_eq!(totals.discount, dec("20.00"));
        assert_eq!(totals.total, dec("180.00"));
    }

    #[test]
    fn test_percent_discount_rounds_half_away_from_zero() {
        // 15% of 0.30 = 0.045
        assert_eq!(
            discount_for(CouponType::Percent, dec("15"), dec("0.30")),
            dec("0.05")
        );
    }

    #[test]
    fn test_fixed_coupon_is_capped_at_subtotal() {
        let c = coupon(CouponType::Fixed, "50.00");
        let totals = Totals::compute([(dec("30.00"), 1)], Some(&c));
        assert_eq!(totals.discount, dec("30.00"));
        assert_eq!(totals.total, Decimal::ZERO);
    }

    #[test]
    fn test_percent_over_hundred_is_capped() {
        assert_eq!(
            discount_for(CouponType::Percent, dec("150"), dec("80.00")),
            dec("80.00")
        );
    }

    #[test]
    fn test_coupon_on_empty_cart_gives_no_discount() {
        let c = coupon(CouponType::Fixed, "10.00");
        let totals = Totals::compute(Vec::new(), Some(&c));
        assert_eq!(totals.discount, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::ZERO);
    }

    #[test]
    fn test_redeemable_window() {
        let c = coupon(CouponType::Percent, "10");
        assert!(c.is_redeemable(Utc::now()));
        assert!(!c.is_redeemable(c.active_from - Duration::seconds(1)));
        assert!(!c.is_redeemable(c.active_to + Duration::seconds(1)));
        assert!(c.is_redeemable(c.active_to));
    }

    #[test]
    fn test_inactive_coupon_is_not_redeemable() {
        let mut c = coupon(CouponType::Percent, "10");
        c.is_active = false;
        assert!(!c.is_redeemable(Utc::now()));
    }

    #[test]
    fn test_usage_limit() {
        let mut c = coupon(CouponType::Percent, "10");
        c.usage_limit = Some(3);
        c.used_count = 2;
        assert!(c.is_redeemable(Utc::now()));
        c.used_count = 3;
        assert!(!c.is_redeemable(Utc::now()));
    }

    #[test]
    fn test_matches_code_ignores_case() {
        let c = coupon(CouponType::Percent, "10");
        assert!(c.matches_code(" bahor10 "));
        assert!(!c.matches_code("YOZ10"));
    }

    #[test]
    fn test_matches_code_non_ascii() {
        let mut c = coupon(CouponType::Percent, "10");
        c.code = "KÜZ20".to_string();
        assert!(c.matches_code("küz20"));
        assert!(!c.matches_code("kuz20"));
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(dec("0")), "0.00");
        assert_eq!(format_money(dec("999.5")), "999.50");
        assert_eq!(format_money(dec("1250000")), "1 250 000.00");
        assert_eq!(format_money(dec("12345.678")), "12 345.68");
        assert_eq!(format_money(dec("-1500")), "-1 500.00");
    }
}
