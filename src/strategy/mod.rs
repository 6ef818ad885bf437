//! Grid trading strategy.
//!
//! Contains:
//! - The price grid built once from the configured limits
//! - Target position resolution for the equity and its inverse equity
//! - Order execution with limit-price adjustment and fill confirmation

mod executor;
pub mod grid;
mod resolver;

pub use executor::{ExecutionSettings, OrderExecutor, SubmittedOrder};
pub use grid::GridTable;
pub use resolver::{
    GridStrategyConfig, GridTradingStrategy, Instrument, OrderLeg, OrderPlan, PositionBand,
};

use rust_decimal::Decimal;
use thiserror::Error;

/// Invalid strategy configuration. Raised at construction only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error("grid_count must be >= 1, got {0}")]
    InvalidGridCount(u32),

    #[error("grid upper limit price {upper} must be greater than lower limit price {lower}")]
    InvalidPriceRange { upper: Decimal, lower: Decimal },

    #[error("grid step {step} is too small for {grid_count} grids at 3 decimal places")]
    GridTooDense { step: Decimal, grid_count: u32 },

    #[error("{0} must be >= 1")]
    InvalidLotSize(&'static str),

    #[error("grid_lower_limit_position must be greater than 0")]
    ZeroLowerLimitPosition,

    #[error("expect {field} to be divisible by {factor} but got {value}")]
    NotDivisible {
        field: &'static str,
        factor: u64,
        value: u64,
    },

    #[error("{field} of {value} is too large")]
    PositionOverflow { field: &'static str, value: u64 },
}
