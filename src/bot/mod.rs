//! Polling loop driving the grid strategy against a broker.
//!
//! Each cycle: check the session, confirm earlier orders are filled, read
//! price and holdings of both instruments, resolve the order plan, then
//! submit sells before buys and wait for every fill.

use crate::config::{InstrumentConfig, RuntimeConfig};
use crate::exchange::{BrokerError, Brokerage};
use crate::strategy::{GridTradingStrategy, Instrument, OrderExecutor, OrderPlan, SubmittedOrder};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Failure of a single polling cycle.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("not all submitted orders are filled all")]
    UnfilledOrders,

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl CycleError {
    /// Whether the loop must stop instead of retrying on the next tick.
    pub fn is_fatal(&self, abort_on_fill_timeout: bool) -> bool {
        match self {
            CycleError::UnfilledOrders => abort_on_fill_timeout,
            CycleError::Broker(BrokerError::FillTimeout { .. }) => abort_on_fill_timeout,
            CycleError::Broker(BrokerError::Auth(_)) => true,
            CycleError::Broker(_) => false,
        }
    }
}

/// What a polling cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Market not in a trading session, nothing fetched
    MarketClosed,
    /// Holdings already match the grid
    NoOrders(OrderPlan),
    /// Orders were submitted (or logged on a dry run)
    Executed {
        plan: OrderPlan,
        orders: Vec<SubmittedOrder>,
    },
}

/// Loop counters for the shutdown summary.
#[derive(Debug, Default, Clone)]
pub struct BotMetrics {
    pub cycles: u64,
    pub market_closed_cycles: u64,
    pub orders_submitted: u64,
    pub errors: u64,
}

/// Grid trading bot for one equity/inverse-equity pair.
pub struct GridBot {
    broker: Arc<dyn Brokerage>,
    strategy: GridTradingStrategy,
    executor: OrderExecutor,
    instruments: InstrumentConfig,
    poll_interval: Duration,
    abort_on_fill_timeout: bool,
    metrics: BotMetrics,
}

impl GridBot {
    pub fn new(
        broker: Arc<dyn Brokerage>,
        strategy: GridTradingStrategy,
        executor: OrderExecutor,
        instruments: InstrumentConfig,
        runtime: &RuntimeConfig,
    ) -> Self {
        Self {
            broker,
            strategy,
            executor,
            instruments,
            poll_interval: runtime.poll_interval(),
            abort_on_fill_timeout: runtime.abort_on_fill_timeout,
            metrics: BotMetrics::default(),
        }
    }

    /// Override the delay between cycles.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn metrics(&self) -> &BotMetrics {
        &self.metrics
    }

    pub fn strategy(&self) -> &GridTradingStrategy {
        &self.strategy
    }

    /// Run cycles until `shutdown` is set or a fatal error occurs.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<(), CycleError> {
        info!(
            symbol = %self.instruments.symbol,
            inverse_symbol = %self.instruments.inverse_symbol,
            poll_interval = ?self.poll_interval,
            dry_run = self.executor.settings().dry_run,
            "Grid trading loop started"
        );

        while !shutdown.load(Ordering::SeqCst) {
            self.metrics.cycles += 1;

            match self.run_cycle().await {
                Ok(CycleOutcome::MarketClosed) => {
                    self.metrics.market_closed_cycles += 1;
                }
                Ok(CycleOutcome::NoOrders(_)) => {}
                Ok(CycleOutcome::Executed { orders, .. }) => {
                    self.metrics.orders_submitted += orders.len() as u64;
                }
                Err(e) if e.is_fatal(self.abort_on_fill_timeout) => {
                    self.metrics.errors += 1;
                    error!(error = %e, "Fatal cycle error, stopping");
                    return Err(e);
                }
                Err(e) => {
                    self.metrics.errors += 1;
                    warn!(error = %e, "Cycle failed, retrying next tick");
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        info!(
            cycles = self.metrics.cycles,
            orders_submitted = self.metrics.orders_submitted,
            errors = self.metrics.errors,
            "Grid trading loop stopped"
        );
        Ok(())
    }

    /// One fetch → resolve → execute pass.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        if !self.broker.is_market_open().await? {
            debug!("Market is not open");
            return Ok(CycleOutcome::MarketClosed);
        }

        if !self.broker.all_submitted_orders_filled().await? {
            return Err(CycleError::UnfilledOrders);
        }

        let snapshot = self.broker.latest_price(&self.instruments.symbol).await?;
        let position = self.broker.position(&self.instruments.symbol).await?;
        let inverse_snapshot = self
            .broker
            .latest_price(&self.instruments.inverse_symbol)
            .await?;
        let inverse_position = self
            .broker
            .position(&self.instruments.inverse_symbol)
            .await?;

        debug!(
            price = %snapshot.price,
            price_time = %snapshot.timestamp,
            position,
            inverse_price = %inverse_snapshot.price,
            inverse_position,
            "Market observed"
        );

        let plan = self
            .strategy
            .resolve(snapshot.price, position, inverse_position);

        debug!(
            order_quantity = plan.order_quantity,
            inverse_order_quantity = plan.inverse_order_quantity,
            "Order plan resolved"
        );

        if plan.is_noop() {
            return Ok(CycleOutcome::NoOrders(plan));
        }

        let mut orders = Vec::new();
        for leg in plan.orders() {
            let (symbol, last_price, price_adjust, tick_size) =
                self.leg_market(leg.instrument, snapshot.price, inverse_snapshot.price);

            info!(
                instrument = %leg.instrument,
                side = %leg.side,
                quantity = leg.quantity,
                "Rebalancing to grid"
            );

            let submitted = self
                .executor
                .execute(
                    self.broker.as_ref(),
                    symbol,
                    leg.side,
                    leg.quantity,
                    last_price,
                    price_adjust,
                    tick_size,
                )
                .await?;
            orders.push(submitted);
        }

        Ok(CycleOutcome::Executed { plan, orders })
    }

    fn leg_market(
        &self,
        instrument: Instrument,
        price: Decimal,
        inverse_price: Decimal,
    ) -> (&str, Decimal, Decimal, Decimal) {
        match instrument {
            Instrument::Primary => (
                self.instruments.symbol.as_str(),
                price,
                self.instruments.price_adjust,
                self.instruments.tick_size,
            ),
            Instrument::Inverse => (
                self.instruments.inverse_symbol.as_str(),
                inverse_price,
                self.instruments.inverse_price_adjust,
                self.instruments.inverse_tick_size,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MockBroker, OrderSide};
    use crate::strategy::{ExecutionSettings, GridStrategyConfig};
    use rust_decimal_macros::dec;

    const SYMBOL: &str = "HK.07226";
    const INVERSE_SYMBOL: &str = "HK.07552";

    async fn broker(price: Decimal, position: i64, inverse_position: i64) -> Arc<MockBroker> {
        let broker = Arc::new(MockBroker::new());
        broker.set_price(SYMBOL, price).await;
        broker.set_price(INVERSE_SYMBOL, dec!(4.5)).await;
        broker.set_position(SYMBOL, position).await;
        broker.set_position(INVERSE_SYMBOL, inverse_position).await;
        broker
    }

    fn bot(broker: Arc<MockBroker>, dry_run: bool) -> GridBot {
        let strategy = GridTradingStrategy::new(&GridStrategyConfig::default()).unwrap();
        let executor = OrderExecutor::new(ExecutionSettings {
            dry_run,
            fill_check_delay: Duration::ZERO,
            order_fill_timeout: Duration::ZERO,
        });
        let runtime = RuntimeConfig {
            dry_run,
            ..Default::default()
        };
        GridBot::new(broker, strategy, executor, InstrumentConfig::default(), &runtime)
            .with_poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_cycle_builds_initial_positions() {
        let broker = broker(dec!(10.05), 0, 0).await;
        let bot = bot(broker.clone(), false);

        let outcome = bot.run_cycle().await.unwrap();
        match outcome {
            CycleOutcome::Executed { plan, orders } => {
                assert_eq!(plan.order_quantity, 9000);
                assert_eq!(plan.inverse_order_quantity, 2000);
                assert_eq!(orders.len(), 2);
            }
            other => panic!("Expected orders, got {other:?}"),
        }

        assert_eq!(broker.position(SYMBOL).await.unwrap(), 9000);
        assert_eq!(broker.position(INVERSE_SYMBOL).await.unwrap(), 2000);

        // Holdings now match the cell: nothing more to do.
        assert!(matches!(
            bot.run_cycle().await.unwrap(),
            CycleOutcome::NoOrders(_)
        ));
    }

    #[tokio::test]
    async fn test_cycle_sells_before_buying() {
        let broker = broker(dec!(10.35), 9000, 2000).await;
        let bot = bot(broker.clone(), false);

        bot.run_cycle().await.unwrap();

        let orders = broker.orders().await;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].request.code, SYMBOL);
        assert_eq!(orders[0].request.trd_side, OrderSide::Sell);
        assert_eq!(orders[0].request.qty, 2000);
        assert_eq!(orders[0].request.price, dec!(10.33));
        assert_eq!(orders[1].request.code, INVERSE_SYMBOL);
        assert_eq!(orders[1].request.trd_side, OrderSide::Buy);
        assert_eq!(orders[1].request.qty, 4000);
        assert_eq!(orders[1].request.price, dec!(4.55));
    }

    #[tokio::test]
    async fn test_market_closed_skips_cycle() {
        let broker = broker(dec!(10.05), 0, 0).await;
        broker.set_market_open(false).await;
        let bot = bot(broker.clone(), false);

        assert_eq!(bot.run_cycle().await.unwrap(), CycleOutcome::MarketClosed);
        assert!(broker.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_places_nothing() {
        let broker = broker(dec!(9.95), 0, 0).await;
        let bot = bot(broker.clone(), true);

        let outcome = bot.run_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Executed { .. }));
        assert!(broker.orders().await.is_empty());
        assert_eq!(broker.position(SYMBOL).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pending_orders_block_cycle() {
        let broker = broker(dec!(10.05), 0, 0).await;
        broker.set_fill_orders(false).await;
        let bot = bot(broker.clone(), false);

        let err = bot.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Broker(BrokerError::FillTimeout { .. })));
        assert!(err.is_fatal(true));
        assert!(!err.is_fatal(false));

        let err = bot.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::UnfilledOrders));
    }

    #[tokio::test]
    async fn test_missing_price_is_retryable() {
        let broker = Arc::new(MockBroker::new());
        let bot = bot(broker, false);

        let err = bot.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Broker(BrokerError::MarketData { .. })));
        assert!(!err.is_fatal(true));
    }

    #[tokio::test]
    async fn test_run_stops_on_fill_timeout() {
        let broker = broker(dec!(10.05), 0, 0).await;
        broker.set_fill_orders(false).await;
        let mut bot = bot(broker, false);

        let result = bot.run(Arc::new(AtomicBool::new(false))).await;
        assert!(matches!(
            result,
            Err(CycleError::Broker(BrokerError::FillTimeout { .. }))
        ));
        assert_eq!(bot.metrics().errors, 1);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let broker = broker(dec!(10.05), 0, 0).await;
        let mut bot = bot(broker, false);

        let shutdown = Arc::new(AtomicBool::new(true));
        assert!(bot.run(shutdown).await.is_ok());
        assert_eq!(bot.metrics().cycles, 0);
    }
}
