//! Fixed-point currency helpers.
//!
//! All currency values are `rust_decimal::Decimal` carried at 2 decimal places.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places used for currency amounts.
pub const CURRENCY_SCALE: u32 = 2;

/// Round a currency amount to 2 decimal places, half-up.
///
/// Midpoints round away from zero, which is half-up for the non-negative
/// amounts the ledger deals with.
pub fn round_currency(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_SCALE);
    rounded
}

/// Round a percentage/score to 2 decimal places, half-up.
pub fn round_rate(value: Decimal) -> Decimal {
    round_currency(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn rounds_midpoint_up() {
        assert_eq!(round_currency(dec("1.005")), dec("1.01"));
        assert_eq!(round_currency(dec("1.004")), dec("1.00"));
        assert_eq!(round_currency(dec("114.2")).to_string(), "114.20");
    }

    #[test]
    fn pads_to_two_places() {
        assert_eq!(round_currency(dec("7")).to_string(), "7.00");
    }
}
