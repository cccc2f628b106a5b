// ============================================================================
// Numeric Module
// Decimal amounts for prices, quantities and ledger balances
// ============================================================================
//
// This module provides:
// - Price/Quantity/Amount type aliases over rust_decimal::Decimal
// - NumericError: Error type for checked arithmetic
// - notional(): the single place where quantity × price is computed, so that
//   reservations and settlements always agree to the last digit
// - within_precision(): the admission bound on scale and magnitude
//
// Design principles:
// - No floating-point operations
// - All arithmetic returns Result (no panics)
// - Values admitted through within_precision() multiply and add exactly:
//   a notional has at most AMOUNT_SCALE decimal places and its magnitude is
//   far below the 96-bit mantissa, so rust_decimal never has to round

mod errors;

pub use errors::{NumericError, NumericResult};

use rust_decimal::Decimal;

/// Limit price of an order, or execution price of a trade.
pub type Price = Decimal;

/// Order and inventory quantity.
pub type Quantity = Decimal;

/// Base-currency amount.
pub type Amount = Decimal;

/// Decimal places a price may carry.
pub const PRICE_SCALE: u32 = 4;

/// Decimal places a quantity (and an instrument balance) may carry.
pub const QUANTITY_SCALE: u32 = 4;

/// Decimal places of a base-currency amount, enough for any `quantity × price`.
pub const AMOUNT_SCALE: u32 = PRICE_SCALE + QUANTITY_SCALE;

/// Largest quantity, price, notional or balance adjustment the exchange accepts.
pub fn max_magnitude() -> Decimal {
    Decimal::from(1_000_000_000_000_000u64)
}

/// `value` without trailing zeros, provided it has at most `max_scale`
/// decimal places and lies within [`max_magnitude`].
pub fn within_precision(value: Decimal, max_scale: u32) -> NumericResult<Decimal> {
    let value = value.normalize();
    if value.scale() > max_scale {
        return Err(NumericError::PrecisionExceeded { max_scale });
    }
    if value.abs() > max_magnitude() {
        return Err(NumericError::Overflow);
    }
    Ok(value)
}

/// Value of `quantity` units at `price`.
#[inline]
pub fn notional(quantity: Quantity, price: Price) -> NumericResult<Amount> {
    quantity.checked_mul(price).ok_or(NumericError::Overflow)
}

/// Checked sum of two amounts.
#[inline]
pub fn checked_sum(lhs: Amount, rhs: Amount) -> NumericResult<Amount> {
    lhs.checked_add(rhs).ok_or(NumericError::Overflow)
}

/// Checked difference `lhs - rhs`.
#[inline]
pub fn checked_diff(lhs: Amount, rhs: Amount) -> NumericResult<Amount> {
    lhs.checked_sub(rhs).ok_or(NumericError::Underflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_notional_is_exact() {
        assert_eq!(notional(dec!(3), dec!(100.5)).unwrap(), dec!(301.5));
        assert_eq!(notional(dec!(0.1), dec!(0.2)).unwrap(), dec!(0.02));
    }

    #[test]
    fn test_notional_overflow() {
        assert_eq!(
            notional(Decimal::MAX, dec!(2)),
            Err(NumericError::Overflow)
        );
    }

    #[test]
    fn test_within_precision() {
        assert_eq!(within_precision(dec!(1.2500), QUANTITY_SCALE).unwrap().scale(), 2);
        assert_eq!(within_precision(dec!(-0.0001), QUANTITY_SCALE).unwrap(), dec!(-0.0001));
        assert_eq!(
            within_precision(dec!(0.3333333333333333333333333333), PRICE_SCALE),
            Err(NumericError::PrecisionExceeded { max_scale: 4 })
        );
        assert_eq!(
            within_precision(max_magnitude() + dec!(1), QUANTITY_SCALE),
            Err(NumericError::Overflow)
        );
    }

    #[test]
    fn test_admitted_values_multiply_exactly() {
        let quantity = max_magnitude() / dec!(10000) - dec!(0.0001);
        let price = dec!(9999.9999);
        let product = notional(quantity, price).unwrap();
        assert_eq!(product.scale(), AMOUNT_SCALE);
        assert_eq!(product / price, quantity);
    }

    #[test]
    fn test_checked_diff_underflow() {
        assert_eq!(checked_diff(Decimal::MIN, dec!(1)), Err(NumericError::Underflow));
        assert_eq!(checked_diff(dec!(5), dec!(7)).unwrap(), dec!(-2));
    }
}
