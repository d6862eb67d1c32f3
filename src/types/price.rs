//! Fixed-point price and size utilities.
//!
//! ## Overview
//!
//! Prices and sizes travel through the book as u64 scaled by 10^8. The tree
//! comparators need exact equality on prices (same price slot, bid/ask
//! flips), so nothing in the hot path is floating point.
//!
//! ## Examples
//!
//! ```
//! use orderbook_model::types::price::{to_fixed, from_fixed_trimmed};
//!
//! let price = to_fixed("101.25").unwrap();
//! assert_eq!(price, 10_125_000_000);
//! assert_eq!(from_fixed_trimmed(price), "101.25");
//! ```

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Scaling factor for fixed-point values: 10^8
pub const SCALE: u64 = 100_000_000;

// ============================================================================
// Conversion Functions
// ============================================================================

/// Parse a decimal string such as `"100.05"` into a fixed-point value.
///
/// `None` for malformed, negative or out-of-range input, and for input with
/// more than 8 decimal places that would not survive the scaling exactly.
///
/// ```
/// use orderbook_model::types::price::to_fixed;
///
/// assert_eq!(to_fixed("0.00000001"), Some(1));
/// assert_eq!(to_fixed("0.000000001"), None);
/// assert_eq!(to_fixed("-1"), None);
/// ```
pub fn to_fixed(s: &str) -> Option<u64> {
    let value = Decimal::from_str(s.trim()).ok()?;
    if value.is_sign_negative() {
        return None;
    }
    let scaled = value.checked_mul(Decimal::from(SCALE))?;
    if !scaled.fract().is_zero() {
        return None;
    }
    scaled.to_u64()
}

/// Fixed-point value as an exact decimal.
pub fn fixed_to_decimal(value: u64) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(value), 8)
}

/// Display form without trailing zeros: `10_005_000_000` is `"100.05"`.
pub fn from_fixed_trimmed(value: u64) -> String {
    fixed_to_decimal(value).normalize().to_string()
}

// ============================================================================
// Lot size
// ============================================================================

/// Multiply a size by an integer lot size.
///
/// The lot size is a plain multiplier, not a fixed-point value. Saturates
/// instead of wrapping so a bogus feed size cannot reorder the book.
#[inline]
pub fn apply_lot(size: u64, lot_size: u32) -> u64 {
    size.saturating_mul(u64::from(lot_size))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quote_prices() {
        assert_eq!(to_fixed("100.05"), Some(10_005_000_000));
        assert_eq!(to_fixed(" 99.98 "), Some(9_998_000_000));
        assert_eq!(to_fixed("0"), Some(0));
        assert_eq!(to_fixed("3"), Some(3 * SCALE));
    }

    #[test]
    fn test_parse_rejects_unrepresentable() {
        assert_eq!(to_fixed("-0.5"), None);
        assert_eq!(to_fixed("1.123456789"), None);
        assert_eq!(to_fixed("IBM"), None);
        assert_eq!(to_fixed(""), None);
        assert_eq!(to_fixed("1000000000000"), None);
    }

    #[test]
    fn test_display_drops_trailing_zeros() {
        assert_eq!(from_fixed_trimmed(10_005_000_000), "100.05");
        assert_eq!(from_fixed_trimmed(5 * SCALE), "5");
        assert_eq!(from_fixed_trimmed(1), "0.00000001");
        assert_eq!(from_fixed_trimmed(0), "0");
    }

    #[test]
    fn test_parse_then_display() {
        for text in ["100.05", "0.25", "12345.6789"] {
            assert_eq!(from_fixed_trimmed(to_fixed(text).unwrap()), text);
        }
    }

    #[test]
    fn test_apply_lot() {
        assert_eq!(apply_lot(300, 1), 300);
        assert_eq!(apply_lot(300, 10), 3_000);
        assert_eq!(apply_lot(u64::MAX, 2), u64::MAX);
    }
}
