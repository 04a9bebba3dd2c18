//! Charge amount normalization.
//!
//! Stored amounts are in minor units (cents); the provider expects a
//! strictly positive integer in major units. **Never use f64 for financial
//! calculations** - the rounding step goes through `Decimal`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Normalize a stored amount to the provider's expected unit.
///
/// Minor units are divided by 100 and rounded to the nearest integer
/// (midpoints away from zero). Historical rows already stored in major
/// units would collapse below 1 under that scaling, so when the scaled
/// value is < 1 but the original was >= 1 the original is kept as-is.
/// The floor is always 1: the provider rejects non-positive amounts.
///
/// # Examples
///
/// ```
/// use gatekit_subscriptions::normalize_amount;
///
/// assert_eq!(normalize_amount(10000), 100); // 100.00 in cents
/// assert_eq!(normalize_amount(30), 30);     // already major units
/// assert_eq!(normalize_amount(0), 1);       // provider floor
/// ```
pub fn normalize_amount(amount: i64) -> i64 {
    let scaled = Decimal::from(amount)
        .checked_div(Decimal::from(100))
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    let mut normalized = scaled.to_i64().unwrap_or(0);
    if normalized < 1 && amount >= 1 {
        normalized = amount;
    }
    normalized.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_units_scaled() {
        assert_eq!(normalize_amount(10000), 100);
        assert_eq!(normalize_amount(500), 5);
        assert_eq!(normalize_amount(100), 1);
    }

    #[test]
    fn test_rounds_to_nearest() {
        assert_eq!(normalize_amount(3099), 31);
        assert_eq!(normalize_amount(3049), 30);
        // Midpoint rounds away from zero
        assert_eq!(normalize_amount(150), 2);
        assert_eq!(normalize_amount(250), 3);
    }

    #[test]
    fn test_major_unit_fallback_no_double_scaling() {
        assert_eq!(normalize_amount(30), 30);
        assert_eq!(normalize_amount(1), 1);
        assert_eq!(normalize_amount(49), 49);
    }

    #[test]
    fn test_floor_is_one() {
        assert_eq!(normalize_amount(0), 1);
        assert_eq!(normalize_amount(-100), 1);
        assert_eq!(normalize_amount(-1), 1);
    }

    #[test]
    fn test_boundary_between_scaling_and_fallback() {
        // 50 cents rounds to 1 under scaling, so no fallback applies
        assert_eq!(normalize_amount(50), 1);
        // 49 cents rounds to 0, falling back to the original value
        assert_eq!(normalize_amount(49), 49);
    }
}
