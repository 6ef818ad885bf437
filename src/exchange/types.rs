//! Type definitions for brokerage gateway requests and responses.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Timestamp format used by the gateway (exchange local time).
pub const GATEWAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type accepted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Enhanced limit order
    Normal,
    Market,
}

/// Order status reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Submitting,
    Submitted,
    FilledPart,
    FilledAll,
    CancelledPart,
    CancelledAll,
    Failed,
    Deleted,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    pub fn is_filled_all(&self) -> bool {
        matches!(self, OrderStatus::FilledAll)
    }

    /// Still working at the broker and not yet filled in full.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            OrderStatus::Submitting | OrderStatus::Submitted | OrderStatus::FilledPart
        )
    }
}

/// Trading session of the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketSession {
    PreMarketBegin,
    Morning,
    Rest,
    Afternoon,
    Closed,
    #[serde(other)]
    Unknown,
}

impl MarketSession {
    /// Continuous trading sessions only.
    pub fn is_open(&self) -> bool {
        matches!(self, MarketSession::Morning | MarketSession::Afternoon)
    }
}

/// Broker-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Latest traded price of a symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSnapshot {
    pub timestamp: NaiveDateTime,
    pub price: Decimal,
}

/// New limit order request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub code: String,
    pub qty: u64,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub trd_side: OrderSide,
    pub order_type: OrderType,
}

impl OrderRequest {
    pub fn limit(code: impl Into<String>, side: OrderSide, qty: u64, price: Decimal) -> Self {
        Self {
            code: code.into(),
            qty,
            price,
            trd_side: side,
            order_type: OrderType::Normal,
        }
    }
}

/// Market snapshot for a symbol.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketSnapshot {
    pub code: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub last_price: Decimal,
    #[serde(deserialize_with = "deserialize_gateway_time")]
    pub update_time: NaiveDateTime,
}

/// Global market state.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketState {
    pub market_hk: MarketSession,
}

/// Holding of a single symbol.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionEntry {
    pub code: String,
    pub qty: i64,
}

/// Acknowledgement of a placed order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderAck {
    pub order_id: OrderId,
}

/// Order details.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderInfo {
    pub order_id: OrderId,
    pub code: String,
    pub order_status: OrderStatus,
    pub qty: u64,
    #[serde(default)]
    pub dealt_qty: u64,
}

/// Error body returned by the gateway on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayErrorBody {
    pub error: String,
}

fn deserialize_gateway_time<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(&s, GATEWAY_TIME_FORMAT).map_err(serde::de::Error::custom)
}

/// Failures of the brokerage collaborator.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Price, position or market state could not be fetched
    #[error("market data unavailable for {what}: {reason}")]
    MarketData { what: String, reason: String },

    /// The broker refused or failed to take an order
    #[error("order rejected for {symbol}: {reason}")]
    Order { symbol: String, reason: String },

    /// An order was not fully filled within the bounded wait
    #[error("order '{order_id}' is not filled all after {waited:?}")]
    FillTimeout { order_id: OrderId, waited: Duration },

    #[error("trade unlock failed: {0}")]
    Auth(String),

    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl BrokerError {
    pub fn market_data(what: impl Into<String>, reason: impl fmt::Display) -> Self {
        BrokerError::MarketData {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_fill_timeout(&self) -> bool {
        matches!(self, BrokerError::FillTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_market_session_open() {
        let state: MarketState = serde_json::from_str(r#"{"market_hk":"MORNING"}"#).unwrap();
        assert!(state.market_hk.is_open());

        let state: MarketState = serde_json::from_str(r#"{"market_hk":"AFTERNOON"}"#).unwrap();
        assert!(state.market_hk.is_open());

        let state: MarketState = serde_json::from_str(r#"{"market_hk":"REST"}"#).unwrap();
        assert!(!state.market_hk.is_open());

        let state: MarketState =
            serde_json::from_str(r#"{"market_hk":"NIGHT_OPEN"}"#).unwrap();
        assert_eq!(state.market_hk, MarketSession::Unknown);
    }

    #[test]
    fn test_snapshot_parses_gateway_time() {
        let snapshot: MarketSnapshot = serde_json::from_str(
            r#"{"code":"HK.07226","last_price":"7.125","update_time":"2024-03-01 10:15:30"}"#,
        )
        .unwrap();
        assert_eq!(snapshot.last_price, dec!(7.125));
        assert_eq!(
            snapshot.update_time.format(GATEWAY_TIME_FORMAT).to_string(),
            "2024-03-01 10:15:30"
        );
    }

    #[test]
    fn test_order_request_serialization() {
        let request = OrderRequest::limit("HK.07552", OrderSide::Sell, 2000, dec!(4.55));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["code"], "HK.07552");
        assert_eq!(json["qty"], 2000);
        assert_eq!(json["price"], "4.55");
        assert_eq!(json["trd_side"], "SELL");
        assert_eq!(json["order_type"], "NORMAL");
    }

    #[test]
    fn test_order_status_fallback() {
        let info: OrderInfo = serde_json::from_str(
            r#"{"order_id":"42","code":"HK.07226","order_status":"WAITING_SUBMIT","qty":100}"#,
        )
        .unwrap();
        assert_eq!(info.order_status, OrderStatus::Unknown);
        assert_eq!(info.dealt_qty, 0);
    }
}
