//! Broker gateway REST client.

use super::traits::Brokerage;
use super::types::*;
use crate::config::GatewayConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, instrument};

const HEADER_API_KEY: &str = "X-GW-APIKEY";
const HEADER_TIMESTAMP: &str = "X-GW-TIMESTAMP";
const HEADER_SIGNATURE: &str = "X-GW-SIGNATURE";

/// REST client for an OpenD-style quote and trade gateway.
pub struct GatewayClient {
    http: Client,
    api_key: String,
    secret_key: String,
    base_url: String,
}

impl GatewayClient {
    /// Create a new gateway client from configuration.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Generate HMAC-SHA256 signature for a request.
    fn sign(&self, payload: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Get current timestamp in milliseconds.
    fn timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    /// Send a signed request and decode the JSON response.
    ///
    /// The signature covers `timestamp + method + path + body`.
    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = match body {
            Some(body) => serde_json::to_string(body).context("Failed to encode request body")?,
            None => String::new(),
        };
        let timestamp = Self::timestamp();
        let signature = self.sign(&format!("{}{}{}{}", timestamp, method, path, body));

        let mut request = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, path))
            .header(HEADER_API_KEY, &self.api_key)
            .header(HEADER_TIMESTAMP, timestamp.to_string())
            .header(HEADER_SIGNATURE, signature);
        if !body.is_empty() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send {} {}", method, path))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from_response(status, response).await);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", path))
    }

    async fn error_from_response(status: StatusCode, response: reqwest::Response) -> anyhow::Error {
        match response.json::<GatewayErrorBody>().await {
            Ok(body) => anyhow!("gateway returned {}: {}", status, body.error),
            Err(_) => anyhow!("gateway returned {}", status),
        }
    }

    // ==================== Trade (Authenticated) ====================

    /// Unlock trading for this session.
    #[instrument(skip_all)]
    pub async fn unlock_trade(&self, password: &str) -> Result<(), BrokerError> {
        if password.is_empty() {
            return Err(BrokerError::Auth("unlock password is empty".to_string()));
        }

        let body = serde_json::json!({ "password": password });
        self.send::<_, serde_json::Value>(Method::POST, "/api/v1/trade/unlock", Some(&body))
            .await
            .map_err(|e| BrokerError::Auth(format!("{:#}", e)))?;

        info!("Trade unlocked");
        Ok(())
    }

    /// Query a single order.
    #[instrument(skip(self))]
    pub async fn order(&self, order_id: &OrderId) -> Result<OrderInfo, BrokerError> {
        let path = format!("/api/v1/orders/{}", urlencoding::encode(&order_id.0));
        self.send::<(), OrderInfo>(Method::GET, &path, None)
            .await
            .map_err(|e| BrokerError::market_data(format!("order {}", order_id), format!("{:#}", e)))
    }

    /// Orders submitted today.
    #[instrument(skip(self))]
    pub async fn today_orders(&self) -> Result<Vec<OrderInfo>, BrokerError> {
        self.send::<(), Vec<OrderInfo>>(Method::GET, "/api/v1/orders?status=today", None)
            .await
            .map_err(|e| BrokerError::market_data("order list", format!("{:#}", e)))
    }

    /// All holdings of the account.
    #[instrument(skip(self))]
    pub async fn positions(&self) -> Result<Vec<PositionEntry>, BrokerError> {
        self.send::<(), Vec<PositionEntry>>(Method::GET, "/api/v1/positions", None)
            .await
            .map_err(|e| BrokerError::market_data("positions", format!("{:#}", e)))
    }

    // ==================== Market Data ====================

    /// Market snapshot of a symbol.
    #[instrument(skip(self))]
    pub async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot, BrokerError> {
        let path = format!("/api/v1/quote/snapshot?code={}", urlencoding::encode(symbol));
        self.send::<(), MarketSnapshot>(Method::GET, &path, None)
            .await
            .map_err(|e| BrokerError::market_data(symbol, format!("{:#}", e)))
    }

    /// Current trading session.
    #[instrument(skip(self))]
    pub async fn market_state(&self) -> Result<MarketState, BrokerError> {
        self.send::<(), MarketState>(Method::GET, "/api/v1/market/state", None)
            .await
            .map_err(|e| BrokerError::market_data("market state", format!("{:#}", e)))
    }
}

#[async_trait]
impl Brokerage for GatewayClient {
    async fn latest_price(&self, symbol: &str) -> Result<PriceSnapshot, BrokerError> {
        let snapshot = self.snapshot(symbol).await?;
        Ok(PriceSnapshot {
            timestamp: snapshot.update_time,
            price: snapshot.last_price,
        })
    }

    async fn position(&self, symbol: &str) -> Result<i64, BrokerError> {
        let positions = self.positions().await?;
        Ok(positions
            .iter()
            .find(|p| p.code == symbol)
            .map(|p| p.qty)
            .unwrap_or(0))
    }

    async fn is_market_open(&self) -> Result<bool, BrokerError> {
        let state = self.market_state().await?;
        debug!(session = ?state.market_hk, "Market state");
        Ok(state.market_hk.is_open())
    }

    #[instrument(skip(self), fields(symbol = %order.code, side = %order.trd_side, qty = order.qty))]
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderId, BrokerError> {
        if order.qty == 0 {
            return Err(BrokerError::Order {
                symbol: order.code.clone(),
                reason: "quantity must be positive".to_string(),
            });
        }

        let ack: OrderAck = self
            .send(Method::POST, "/api/v1/orders", Some(order))
            .await
            .map_err(|e| BrokerError::Order {
                symbol: order.code.clone(),
                reason: format!("{:#}", e),
            })?;

        Ok(ack.order_id)
    }

    async fn is_order_fully_filled(&self, order_id: &OrderId) -> Result<bool, BrokerError> {
        let order = self.order(order_id).await?;
        debug!(
            %order_id,
            status = ?order.order_status,
            qty = order.qty,
            dealt_qty = order.dealt_qty,
            "Order status"
        );
        Ok(order.order_status.is_filled_all())
    }

    async fn all_submitted_orders_filled(&self) -> Result<bool, BrokerError> {
        let orders = self.today_orders().await?;
        Ok(!orders.iter().any(|o| o.order_status.is_pending()))
    }
}
