//! Decimal arithmetic utilities for price calculations.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places kept for grid lines and limit prices.
pub const PRICE_DECIMALS: u32 = 3;

/// Round a decimal to a specific number of decimal places, halves away from zero.
pub fn round_to_precision(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a price to [`PRICE_DECIMALS`] places.
pub fn round_price(value: Decimal) -> Decimal {
    round_to_precision(value, PRICE_DECIMALS)
}

/// Round to the nearest whole number, halves to even.
///
/// Used for ratios that must land on a whole grid.
pub fn round_half_even(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
}

/// Round to tick size (e.g., 0.01 for most prices).
pub fn round_to_tick(value: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size == Decimal::ZERO {
        return value;
    }
    (value / tick_size).round() * tick_size
}
