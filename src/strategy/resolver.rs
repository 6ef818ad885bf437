//! Grid position sizing for an equity and its inverse equity.

use super::grid::GridTable;
use super::StrategyError;
use crate::exchange::OrderSide;
use crate::utils::decimal::round_half_even;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Grid strategy parameters (the `grid_trading_strategy` config section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridStrategyConfig {
    /// Highest grid line
    pub grid_upper_limit_price: Decimal,
    /// Lowest grid line
    pub grid_lower_limit_price: Decimal,
    /// Number of intervals between the two limits
    #[serde(deserialize_with = "deserialize_grid_count")]
    pub grid_count: u32,
    /// Equity position held when price is at or below the lowest line
    pub grid_lower_limit_position: u64,
    /// Inverse equity position held when price is at or above the highest line
    #[serde(alias = "ie_max_position")]
    pub inverse_equity_max_position: u64,
    /// Equity lot size
    #[serde(default = "default_lot_size")]
    pub lot_size: u64,
    /// Inverse equity lot size
    #[serde(default = "default_lot_size", alias = "ie_lot_size")]
    pub inverse_lot_size: u64,
}

fn default_lot_size() -> u64 {
    100
}

/// Accept only whole numbers. Plain `u32` deserialization through the
/// `config` crate rounds floats, so `9.6` would silently become `10`.
fn deserialize_grid_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    struct GridCountVisitor;

    impl<'de> Visitor<'de> for GridCountVisitor {
        type Value = u32;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an integer grid count")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u32, E> {
            u32::try_from(value).map_err(|_| E::invalid_value(Unexpected::Unsigned(value), &self))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u32, E> {
            u32::try_from(value).map_err(|_| E::invalid_value(Unexpected::Signed(value), &self))
        }

        // Environment overrides arrive as strings
        fn visit_str<E: de::Error>(self, value: &str) -> Result<u32, E> {
            value
                .trim()
                .parse()
                .map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_any(GridCountVisitor)
}

impl Default for GridStrategyConfig {
    fn default() -> Self {
        Self {
            grid_upper_limit_price: Decimal::new(11, 0),
            grid_lower_limit_price: Decimal::new(10, 0),
            grid_count: 10,
            grid_lower_limit_position: 10_000,
            inverse_equity_max_position: 20_000,
            lot_size: default_lot_size(),
            inverse_lot_size: default_lot_size(),
        }
    }
}

/// Which leg of the pair an order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    /// The equity being grid-traded
    Primary,
    /// The inverse equity used as a hedge
    Inverse,
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instrument::Primary => write!(f, "equity"),
            Instrument::Inverse => write!(f, "inverse equity"),
        }
    }
}

/// Range of equity positions consistent with a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionBand {
    pub min: i64,
    pub max: i64,
}

impl PositionBand {
    /// Nearest position inside the band. Positions already inside are kept.
    pub fn clamp(&self, position: i64) -> i64 {
        if position < self.min {
            self.min
        } else if position > self.max {
            self.max
        } else {
            position
        }
    }
}

/// A single order to submit. Quantity is always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLeg {
    pub instrument: Instrument,
    pub side: OrderSide,
    pub quantity: u64,
}

/// Everything the strategy derived for one price/position observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderPlan {
    pub grid_index: u32,
    pub band: PositionBand,
    pub target_position: i64,
    /// Signed: positive buys, negative sells
    pub order_quantity: i64,
    pub inverse_grid_index: i64,
    pub inverse_target_position: i64,
    /// Signed: positive buys, negative sells
    pub inverse_order_quantity: i64,
}

impl OrderPlan {
    /// Whether any order is required.
    pub fn is_noop(&self) -> bool {
        self.order_quantity == 0 && self.inverse_order_quantity == 0
    }

    /// Order legs in submission order: sells before buys, equity before inverse.
    pub fn orders(&self) -> Vec<OrderLeg> {
        let legs = [
            (Instrument::Primary, self.order_quantity),
            (Instrument::Inverse, self.inverse_order_quantity),
        ];

        let sells = legs.iter().filter(|(_, qty)| *qty < 0).map(|(instrument, qty)| OrderLeg {
            instrument: *instrument,
            side: OrderSide::Sell,
            quantity: qty.unsigned_abs(),
        });
        let buys = legs.iter().filter(|(_, qty)| *qty > 0).map(|(instrument, qty)| OrderLeg {
            instrument: *instrument,
            side: OrderSide::Buy,
            quantity: qty.unsigned_abs(),
        });

        sells.chain(buys).collect()
    }
}

/// Maps price and holdings to target positions for the equity/inverse pair.
///
/// Higher prices map to a smaller equity target and a larger inverse target.
/// The equity position is only moved when it has drifted outside the band of
/// the current grid cell, so price moves within a cell do not cause trades.
#[derive(Debug, Clone)]
pub struct GridTradingStrategy {
    grid: GridTable,
    position_per_grid: i64,
    inverse_position_per_grid: i64,
    lot_size: u64,
    inverse_lot_size: u64,
}

impl GridTradingStrategy {
    /// Validate the configuration and build the grid table.
    ///
    /// Both position limits must divide evenly into `grid_count` lots so the
    /// per-grid sizes are whole, tradable quantities.
    pub fn new(config: &GridStrategyConfig) -> Result<Self, StrategyError> {
        let grid = GridTable::new(
            config.grid_upper_limit_price,
            config.grid_lower_limit_price,
            config.grid_count,
        )?;

        if config.lot_size == 0 {
            return Err(StrategyError::InvalidLotSize("lot_size"));
        }
        if config.inverse_lot_size == 0 {
            return Err(StrategyError::InvalidLotSize("inverse_lot_size"));
        }
        if config.grid_lower_limit_position == 0 {
            return Err(StrategyError::ZeroLowerLimitPosition);
        }

        let grid_count = u64::from(config.grid_count);
        check_divisible(
            "grid_lower_limit_position",
            config.grid_lower_limit_position,
            grid_count.saturating_mul(config.lot_size),
        )?;
        check_divisible(
            "inverse_equity_max_position",
            config.inverse_equity_max_position,
            grid_count.saturating_mul(config.inverse_lot_size),
        )?;

        let position_per_grid = to_signed(
            "grid_lower_limit_position",
            config.grid_lower_limit_position / grid_count,
        )?;
        let inverse_position_per_grid = to_signed(
            "inverse_equity_max_position",
            config.inverse_equity_max_position / grid_count,
        )?;

        // Band bounds reach (grid_count + 1) grids, the inverse target grid_count grids.
        check_fits(
            "grid_lower_limit_position",
            config.grid_lower_limit_position,
            position_per_grid,
            i64::from(config.grid_count) + 1,
        )?;
        check_fits(
            "inverse_equity_max_position",
            config.inverse_equity_max_position,
            inverse_position_per_grid,
            i64::from(config.grid_count),
        )?;

        debug!(
            lot_size = config.lot_size,
            inverse_lot_size = config.inverse_lot_size,
            grid_lower_limit_position = config.grid_lower_limit_position,
            inverse_equity_max_position = config.inverse_equity_max_position,
            position_per_grid,
            inverse_position_per_grid,
            "Grid trading strategy initialised"
        );

        Ok(Self {
            grid,
            position_per_grid,
            inverse_position_per_grid,
            lot_size: config.lot_size,
            inverse_lot_size: config.inverse_lot_size,
        })
    }

    pub fn grid(&self) -> &GridTable {
        &self.grid
    }

    pub fn position_per_grid(&self) -> i64 {
        self.position_per_grid
    }

    pub fn inverse_position_per_grid(&self) -> i64 {
        self.inverse_position_per_grid
    }

    pub fn lot_size(&self) -> u64 {
        self.lot_size
    }

    pub fn inverse_lot_size(&self) -> u64 {
        self.inverse_lot_size
    }

    /// Which grid cell the price falls in (see [`GridTable::index_of`]).
    pub fn grid_index(&self, price: Decimal) -> u32 {
        self.grid.index_of(price)
    }

    /// Equity positions consistent with a grid cell.
    ///
    /// Above the top line the band collapses to `[0, 0]`.
    pub fn band(&self, grid_index: u32) -> PositionBand {
        let cells_above = i64::from(self.grid.grid_count()) - i64::from(grid_index);
        let min = (cells_above * self.position_per_grid).max(0);
        let max = (cells_above + 1) * self.position_per_grid;
        PositionBand {
            min,
            max: max.max(min),
        }
    }

    /// Resolve targets and signed order quantities for both instruments.
    ///
    /// The inverse target follows the resulting equity target, not the
    /// current equity position.
    pub fn resolve(&self, price: Decimal, position: i64, inverse_position: i64) -> OrderPlan {
        let grid_index = self.grid_index(price);
        let band = self.band(grid_index);
        let target_position = band.clamp(position);
        let order_quantity = target_position - position;

        debug!(
            %price,
            grid_index,
            min_grid_position = band.min,
            max_grid_position = band.max,
            target_position,
            order_quantity,
            "Resolved equity target"
        );

        let inverse_grid_index = self.inverse_grid_index(target_position);
        let inverse_target_position = self.inverse_target(target_position);
        let inverse_order_quantity = inverse_target_position - inverse_position;

        debug!(
            inverse_grid_index,
            inverse_target_position, inverse_order_quantity, "Resolved inverse equity target"
        );

        OrderPlan {
            grid_index,
            band,
            target_position,
            order_quantity,
            inverse_grid_index,
            inverse_target_position,
            inverse_order_quantity,
        }
    }

    /// Signed `(equity, inverse equity)` order quantities.
    pub fn order_quantities(
        &self,
        price: Decimal,
        position: i64,
        inverse_position: i64,
    ) -> (i64, i64) {
        let plan = self.resolve(price, position, inverse_position);
        (plan.order_quantity, plan.inverse_order_quantity)
    }

    /// Inverse equity position that hedges an equity target.
    ///
    /// The grid index is clamped to `[0, grid_count]`. Without the clamp an
    /// equity target above `grid_lower_limit_position` would produce a
    /// negative inverse target (at 9.95 holding 11000 the unclamped inverse
    /// target is -2000 rather than 0).
    pub fn inverse_target(&self, target_position: i64) -> i64 {
        self.inverse_grid_index(target_position) * self.inverse_position_per_grid
    }

    /// How many grids of inverse exposure match an equity target.
    fn inverse_grid_index(&self, target_position: i64) -> i64 {
        let grid_count = i64::from(self.grid.grid_count());
        let ratio = Decimal::from(target_position) / Decimal::from(self.position_per_grid);
        let index = round_half_even(Decimal::from(grid_count) - ratio)
            .to_i64()
            .unwrap_or(0);
        index.clamp(0, grid_count)
    }
}

fn check_divisible(field: &'static str, value: u64, factor: u64) -> Result<(), StrategyError> {
    if value % factor != 0 {
        return Err(StrategyError::NotDivisible {
            field,
            factor,
            value,
        });
    }
    Ok(())
}

fn check_fits(
    field: &'static str,
    value: u64,
    per_grid: i64,
    grids: i64,
) -> Result<(), StrategyError> {
    per_grid
        .checked_mul(grids)
        .map(|_| ())
        .ok_or(StrategyError::PositionOverflow { field, value })
}

fn to_signed(field: &'static str, value: u64) -> Result<i64, StrategyError> {
    i64::try_from(value).map_err(|_| StrategyError::PositionOverflow { field, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config(grid_count: u32, lower_limit_position: u64, inverse_max: u64) -> GridStrategyConfig {
        GridStrategyConfig {
            grid_upper_limit_price: dec!(11),
            grid_lower_limit_price: dec!(10),
            grid_count,
            grid_lower_limit_position: lower_limit_position,
            inverse_equity_max_position: inverse_max,
            lot_size: 100,
            inverse_lot_size: 100,
        }
    }

    fn strategy() -> GridTradingStrategy {
        GridTradingStrategy::new(&config(10, 10000, 20000)).unwrap()
    }

    #[test]
    fn test_position_per_grid() {
        let strategy = GridTradingStrategy::new(&config(5, 10000, 20000)).unwrap();
        assert_eq!(strategy.position_per_grid(), 2000);
        assert_eq!(strategy.inverse_position_per_grid(), 4000);
    }

    #[test]
    fn test_position_per_grid_cannot_be_divided() {
        let err = GridTradingStrategy::new(&config(15, 10000, 20000)).unwrap_err();
        assert_eq!(
            err,
            StrategyError::NotDivisible {
                field: "grid_lower_limit_position",
                factor: 1500,
                value: 10000,
            }
        );
    }

    #[test]
    fn test_inverse_position_must_divide_into_lots() {
        let mut cfg = config(10, 10000, 20000);
        cfg.inverse_lot_size = 3000;
        assert!(matches!(
            GridTradingStrategy::new(&cfg),
            Err(StrategyError::NotDivisible {
                field: "inverse_equity_max_position",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_zero_lot_size_and_zero_position() {
        let mut cfg = config(10, 10000, 20000);
        cfg.lot_size = 0;
        assert_eq!(
            GridTradingStrategy::new(&cfg).unwrap_err(),
            StrategyError::InvalidLotSize("lot_size")
        );

        assert_eq!(
            GridTradingStrategy::new(&config(10, 0, 20000)).unwrap_err(),
            StrategyError::ZeroLowerLimitPosition
        );
    }

    #[test]
    fn test_rejects_positions_that_overflow_the_band() {
        let err = GridTradingStrategy::new(&config(10, 9_223_372_036_854_775_000, 20000))
            .unwrap_err();
        assert_eq!(
            err,
            StrategyError::PositionOverflow {
                field: "grid_lower_limit_position",
                value: 9_223_372_036_854_775_000,
            }
        );

        let err = GridTradingStrategy::new(&config(10, 10000, 18_446_744_073_709_551_000))
            .unwrap_err();
        assert!(matches!(
            err,
            StrategyError::PositionOverflow {
                field: "inverse_equity_max_position",
                ..
            }
        ));
    }

    #[test]
    fn test_grid_count_must_be_an_integer() {
        let json = |grid_count: &str| {
            format!(
                r#"{{"grid_upper_limit_price": "11", "grid_lower_limit_price": "10",
                    "grid_count": {grid_count}, "grid_lower_limit_position": 10000,
                    "inverse_equity_max_position": 20000}}"#
            )
        };

        let cfg: GridStrategyConfig = serde_json::from_str(&json("10")).unwrap();
        assert_eq!(cfg.grid_count, 10);
        assert!(serde_json::from_str::<GridStrategyConfig>(&json("9.6")).is_err());
        assert!(serde_json::from_str::<GridStrategyConfig>(&json("10.0")).is_err());
        assert!(serde_json::from_str::<GridStrategyConfig>(&json("-1")).is_err());
    }

    #[test]
    fn test_zero_inverse_max_position_is_allowed() {
        let strategy = GridTradingStrategy::new(&config(10, 10000, 0)).unwrap();
        assert_eq!(strategy.order_quantities(dec!(10.55), 0, 300), (4000, -300));
    }

    #[test]
    fn test_cal_order_quantity() {
        let strategy = strategy();
        assert_eq!(strategy.order_quantities(dec!(9.95), 0, 0), (10000, 0));
        assert_eq!(strategy.order_quantities(dec!(10.05), 0, 0), (9000, 2000));

        assert_eq!(strategy.order_quantities(dec!(10.05), 9000, 2000), (0, 0));
        assert_eq!(strategy.order_quantities(dec!(10.05), 10000, 0), (0, 0));

        assert_eq!(strategy.order_quantities(dec!(11.05), 0, 0), (0, 20000));
        assert_eq!(strategy.order_quantities(dec!(10.95), 0, 0), (0, 20000));

        assert_eq!(strategy.order_quantities(dec!(10.95), 0, 20000), (0, 0));
        assert_eq!(strategy.order_quantities(dec!(10.95), 1000, 18000), (0, 0));
    }

    #[test]
    fn test_sells_down_when_price_rises() {
        let strategy = strategy();
        // Holding the 10.0-10.1 band bounds, price jumps three cells
        let plan = strategy.resolve(dec!(10.35), 9000, 2000);
        assert_eq!(plan.grid_index, 4);
        assert_eq!(plan.band, PositionBand { min: 6000, max: 7000 });
        assert_eq!(plan.order_quantity, -2000);
        assert_eq!(plan.inverse_target_position, 6000);
        assert_eq!(plan.inverse_order_quantity, 4000);
    }

    #[test]
    fn test_above_top_line_sells_everything() {
        let strategy = strategy();
        let plan = strategy.resolve(dec!(11.05), 1000, 18000);
        assert_eq!(plan.band, PositionBand { min: 0, max: 0 });
        assert_eq!(plan.order_quantity, -1000);
        assert_eq!(plan.inverse_order_quantity, 2000);
    }

    #[test]
    fn test_inverse_target_follows_equity_target_not_current_position() {
        let strategy = strategy();
        // Current equity of 3000 would imply 7 inverse grids; the target is 9000.
        let plan = strategy.resolve(dec!(10.05), 3000, 0);
        assert_eq!(plan.target_position, 9000);
        assert_eq!(plan.inverse_grid_index, 1);
        assert_eq!(plan.inverse_order_quantity, 2000);
    }

    #[test]
    fn test_inverse_index_clamped_when_equity_above_lower_limit() {
        let strategy = strategy();
        let plan = strategy.resolve(dec!(9.95), 11000, 0);
        assert_eq!(plan.order_quantity, 0);
        assert_eq!(plan.inverse_grid_index, 0);
        assert_eq!(plan.inverse_order_quantity, 0);

        // Held inverse is sold down to zero, never below
        assert_eq!(strategy.order_quantities(dec!(9.95), 11000, 500), (0, -500));
    }

    #[test]
    fn test_inside_band_position_rounds_inverse_to_whole_grid() {
        let strategy = strategy();
        // 9500 is 9.5 grids of equity: 0.5 inverse grids, halves to even.
        let plan = strategy.resolve(dec!(10.05), 9500, 0);
        assert_eq!(plan.order_quantity, 0);
        assert_eq!(plan.inverse_grid_index, 0);

        // 8500 is 8.5 grids: 1.5 inverse grids rounds to 2.
        let plan = strategy.resolve(dec!(10.15), 8500, 0);
        assert_eq!(plan.order_quantity, 0);
        assert_eq!(plan.inverse_grid_index, 2);
        assert_eq!(plan.inverse_order_quantity, 4000);
    }

    #[test]
    fn test_target_lands_on_band_bound_or_current_position() {
        let strategy = strategy();
        let prices = [dec!(9.5), dec!(10), dec!(10.05), dec!(10.5), dec!(10.999), dec!(11), dec!(12)];
        let positions = [0, 500, 1000, 4300, 9000, 10000, 12000];

        for price in prices {
            for position in positions {
                let plan = strategy.resolve(price, position, 0);
                let landed = position + plan.order_quantity;
                assert!(
                    landed == plan.band.min || landed == plan.band.max || landed == position,
                    "price={price} position={position} landed={landed}"
                );
                assert!(landed >= plan.band.min && landed <= plan.band.max);
            }
        }
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let strategy = strategy();
        let first = strategy.resolve(dec!(10.42), 2000, 5000);
        let second = strategy.resolve(dec!(10.42), 2000, 5000);
        assert_eq!(first, second);

        let settled = strategy.resolve(
            dec!(10.42),
            first.target_position,
            first.inverse_target_position,
        );
        assert!(settled.is_noop());
    }

    #[test]
    fn test_targets_monotonic_as_price_rises() {
        let strategy = strategy();
        let mut position = 0;
        let mut inverse_position = 0;
        let mut last: Option<OrderPlan> = None;

        for cents in (950..=1110).step_by(5) {
            let price = Decimal::new(cents, 2);
            let plan = strategy.resolve(price, position, inverse_position);
            if let Some(prev) = last {
                assert!(plan.target_position <= prev.target_position, "price={price}");
                assert!(
                    plan.inverse_target_position >= prev.inverse_target_position,
                    "price={price}"
                );
            }
            position = plan.target_position;
            inverse_position = plan.inverse_target_position;
            last = Some(plan);
        }
    }

    #[test]
    fn test_orders_sell_before_buy() {
        let strategy = strategy();
        let plan = strategy.resolve(dec!(10.35), 9000, 2000);
        assert_eq!(
            plan.orders(),
            vec![
                OrderLeg {
                    instrument: Instrument::Primary,
                    side: OrderSide::Sell,
                    quantity: 2000,
                },
                OrderLeg {
                    instrument: Instrument::Inverse,
                    side: OrderSide::Buy,
                    quantity: 4000,
                },
            ]
        );

        let plan = strategy.resolve(dec!(10.05), 0, 8000);
        let sides: Vec<_> = plan.orders().iter().map(|o| (o.instrument, o.side)).collect();
        assert_eq!(
            sides,
            vec![
                (Instrument::Inverse, OrderSide::Sell),
                (Instrument::Primary, OrderSide::Buy),
            ]
        );
    }
}
