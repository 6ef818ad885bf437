//! In-memory paper broker.

use super::traits::Brokerage;
use super::types::*;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// A simulated order and its status.
#[derive(Debug, Clone)]
pub struct MockOrder {
    pub order_id: OrderId,
    pub request: OrderRequest,
    pub status: OrderStatus,
}

/// Paper trading state.
#[derive(Debug, Default)]
struct MockBrokerState {
    pub market_open: bool,
    pub prices: HashMap<String, Decimal>,
    pub positions: HashMap<String, i64>,
    pub orders: Vec<MockOrder>,
    /// Orders stay `SUBMITTED` and positions unchanged while false
    pub fill_orders: bool,
}

/// Broker that keeps prices, positions and orders in memory.
///
/// Orders fill immediately at their limit price unless filling is disabled.
pub struct MockBroker {
    state: Arc<RwLock<MockBrokerState>>,
    order_id_counter: AtomicU64,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBroker {
    /// Create an open market with no holdings that fills every order.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MockBrokerState {
                market_open: true,
                fill_orders: true,
                ..Default::default()
            })),
            order_id_counter: AtomicU64::new(1),
        }
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.state.write().await.prices.insert(symbol.to_string(), price);
    }

    pub async fn set_position(&self, symbol: &str, qty: i64) {
        self.state.write().await.positions.insert(symbol.to_string(), qty);
    }

    pub async fn set_market_open(&self, open: bool) {
        self.state.write().await.market_open = open;
    }

    pub async fn set_fill_orders(&self, fill: bool) {
        self.state.write().await.fill_orders = fill;
    }

    /// Orders placed so far, oldest first.
    pub async fn orders(&self) -> Vec<MockOrder> {
        self.state.read().await.orders.clone()
    }

    fn next_order_id(&self) -> OrderId {
        OrderId(self.order_id_counter.fetch_add(1, Ordering::SeqCst).to_string())
    }

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

#[async_trait]
impl Brokerage for MockBroker {
    async fn latest_price(&self, symbol: &str) -> Result<PriceSnapshot, BrokerError> {
        let state = self.state.read().await;
        let price = state
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| BrokerError::market_data(symbol, "no price set"))?;
        Ok(PriceSnapshot {
            timestamp: Self::now(),
            price,
        })
    }

    async fn position(&self, symbol: &str) -> Result<i64, BrokerError> {
        Ok(self.state.read().await.positions.get(symbol).copied().unwrap_or(0))
    }

    async fn is_market_open(&self) -> Result<bool, BrokerError> {
        Ok(self.state.read().await.market_open)
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderId, BrokerError> {
        if order.qty == 0 {
            return Err(BrokerError::Order {
                symbol: order.code.clone(),
                reason: "quantity must be positive".to_string(),
            });
        }

        let mut state = self.state.write().await;
        let order_id = self.next_order_id();

        let status = if state.fill_orders {
            let qty = i64::try_from(order.qty).map_err(|_| BrokerError::Order {
                symbol: order.code.clone(),
                reason: format!("quantity {} is too large", order.qty),
            })?;
            let position = state.positions.entry(order.code.clone()).or_insert(0);
            match order.trd_side {
                OrderSide::Buy => *position += qty,
                OrderSide::Sell => *position -= qty,
            }
            OrderStatus::FilledAll
        } else {
            OrderStatus::Submitted
        };

        info!(
            %order_id,
            symbol = %order.code,
            side = %order.trd_side,
            qty = order.qty,
            price = %order.price,
            status = ?status,
            "Mock order placed"
        );

        state.orders.push(MockOrder {
            order_id: order_id.clone(),
            request: order.clone(),
            status,
        });

        Ok(order_id)
    }

    async fn is_order_fully_filled(&self, order_id: &OrderId) -> Result<bool, BrokerError> {
        let state = self.state.read().await;
        state
            .orders
            .iter()
            .find(|o| &o.order_id == order_id)
            .map(|o| o.status.is_filled_all())
            .ok_or_else(|| BrokerError::market_data(format!("order {}", order_id), "unknown order"))
    }

    async fn all_submitted_orders_filled(&self) -> Result<bool, BrokerError> {
        Ok(!self
            .state
            .read()
            .await
            .orders
            .iter()
            .any(|o| o.status.is_pending()))
    }
}
