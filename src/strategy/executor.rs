//! Order execution and fill confirmation.

use crate::config::RuntimeConfig;
use crate::exchange::{BrokerError, Brokerage, OrderId, OrderRequest, OrderSide};
use crate::utils::decimal::round_to_tick;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Execution behaviour taken from the runtime config.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Log orders instead of submitting them
    pub dry_run: bool,
    /// Wait before the first fill check
    pub fill_check_delay: Duration,
    /// Further wait before the final fill check
    pub order_fill_timeout: Duration,
}

impl From<&RuntimeConfig> for ExecutionSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            fill_check_delay: config.fill_check_delay(),
            order_fill_timeout: config.order_fill_timeout(),
        }
    }
}

/// Result of an order submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub limit_price: Decimal,
    /// `None` when the order was skipped by a dry run
    pub order_id: Option<OrderId>,
}

/// Submits grid orders and waits for them to fill.
pub struct OrderExecutor {
    settings: ExecutionSettings,
}

impl OrderExecutor {
    /// Create a new order executor.
    pub fn new(settings: ExecutionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Limit price that crosses the spread: BUY above and SELL below the last price.
    pub fn limit_price(
        last_price: Decimal,
        price_adjust: Decimal,
        tick_size: Decimal,
        side: OrderSide,
    ) -> Decimal {
        let adjusted = match side {
            OrderSide::Buy => last_price + price_adjust,
            OrderSide::Sell => last_price - price_adjust,
        };
        round_to_tick(adjusted, tick_size)
    }

    /// Place a limit order and block until it is filled in full.
    ///
    /// Fails with [`BrokerError::FillTimeout`] if the order is still not
    /// filled after the bounded wait.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute<B: Brokerage + ?Sized>(
        &self,
        broker: &B,
        symbol: &str,
        side: OrderSide,
        quantity: u64,
        last_price: Decimal,
        price_adjust: Decimal,
        tick_size: Decimal,
    ) -> Result<SubmittedOrder, BrokerError> {
        let limit_price = Self::limit_price(last_price, price_adjust, tick_size, side);

        info!(
            %symbol,
            %side,
            quantity,
            price = %limit_price,
            "Placing order"
        );

        let mut submitted = SubmittedOrder {
            symbol: symbol.to_string(),
            side,
            quantity,
            limit_price,
            order_id: None,
        };

        if self.settings.dry_run {
            debug!(%symbol, "Dry run is on, order not submitted");
            return Ok(submitted);
        }

        let request = OrderRequest::limit(symbol, side, quantity, limit_price);
        let order_id = broker.place_order(&request).await?;
        info!(%symbol, %order_id, "Order placed");

        self.wait_until_filled(broker, &order_id).await?;
        submitted.order_id = Some(order_id);
        Ok(submitted)
    }

    /// Check the fill once after a short delay and once more after the timeout.
    pub async fn wait_until_filled<B: Brokerage + ?Sized>(
        &self,
        broker: &B,
        order_id: &OrderId,
    ) -> Result<(), BrokerError> {
        tokio::time::sleep(self.settings.fill_check_delay).await;
        if broker.is_order_fully_filled(order_id).await? {
            info!(%order_id, "Order filled");
            return Ok(());
        }

        debug!(
            %order_id,
            timeout = ?self.settings.order_fill_timeout,
            "Order not filled yet, waiting"
        );
        tokio::time::sleep(self.settings.order_fill_timeout).await;
        if broker.is_order_fully_filled(order_id).await? {
            info!(%order_id, "Order filled");
            return Ok(());
        }

        warn!(%order_id, "Order not filled all within timeout");
        Err(BrokerError::FillTimeout {
            order_id: order_id.clone(),
            waited: self.settings.fill_check_delay + self.settings.order_fill_timeout,
        })
    }
}
