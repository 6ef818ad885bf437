//! Brokerage interface consumed by the trading loop.
//!
//! Implemented by the live gateway client and by the in-memory paper broker,
//! so the loop and the executor can be driven by either.

use super::types::{BrokerError, OrderId, OrderRequest, PriceSnapshot};
use async_trait::async_trait;

/// Market data and order routing for a single brokerage account.
#[async_trait]
pub trait Brokerage: Send + Sync {
    /// Latest traded price of a symbol.
    async fn latest_price(&self, symbol: &str) -> Result<PriceSnapshot, BrokerError>;

    /// Held quantity of a symbol, 0 when not held.
    async fn position(&self, symbol: &str) -> Result<i64, BrokerError>;

    /// Whether the market is in a continuous trading session.
    async fn is_market_open(&self) -> Result<bool, BrokerError>;

    /// Submit a limit order and return its broker id.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderId, BrokerError>;

    /// Whether the order has been filled in full.
    async fn is_order_fully_filled(&self, order_id: &OrderId) -> Result<bool, BrokerError>;

    /// Whether every order submitted by this account is filled in full.
    async fn all_submitted_orders_filled(&self) -> Result<bool, BrokerError>;
}
