//! Price ladder shared by every polling cycle.

use super::StrategyError;
use crate::utils::decimal::round_price;
use rust_decimal::Decimal;

/// Evenly spaced price lines between a lower and an upper bound.
///
/// Built once at startup. Lines are rounded to 3 decimal places and strictly
/// increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct GridTable {
    lines: Vec<Decimal>,
    step: Decimal,
}

impl GridTable {
    /// Build `grid_count + 1` lines from `lower_price` to `upper_price`.
    pub fn new(
        upper_price: Decimal,
        lower_price: Decimal,
        grid_count: u32,
    ) -> Result<Self, StrategyError> {
        if grid_count < 1 {
            return Err(StrategyError::InvalidGridCount(grid_count));
        }
        if upper_price <= lower_price {
            return Err(StrategyError::InvalidPriceRange {
                upper: upper_price,
                lower: lower_price,
            });
        }

        let step = (upper_price - lower_price) / Decimal::from(grid_count);
        let lines: Vec<Decimal> = (0..=grid_count)
            .map(|i| round_price(lower_price + step * Decimal::from(i)))
            .collect();

        // Rounding to 3 dp can collapse adjacent lines on very narrow ranges.
        if lines.windows(2).any(|w| w[0] >= w[1]) {
            return Err(StrategyError::GridTooDense {
                step,
                grid_count,
            });
        }

        Ok(Self { lines, step })
    }

    /// Which grid cell a price falls in.
    ///
    /// Returns the number of lines at or below `price`: 0 below the lowest
    /// line, `grid_count` exactly at the top line, `grid_count + 1` above it.
    pub fn index_of(&self, price: Decimal) -> u32 {
        self.lines.partition_point(|line| *line <= price) as u32
    }

    pub fn lines(&self) -> &[Decimal] {
        &self.lines
    }

    pub fn grid_count(&self) -> u32 {
        (self.lines.len() - 1) as u32
    }

    pub fn lower(&self) -> Decimal {
        self.lines[0]
    }

    pub fn upper(&self) -> Decimal {
        self.lines[self.lines.len() - 1]
    }

    /// Unrounded distance between adjacent lines.
    pub fn step(&self) -> Decimal {
        self.step
    }
}
