//! Configuration management for the grid trading bot.
//!
//! Loads settings from a YAML file, environment variables and `.env`.

use crate::strategy::{GridStrategyConfig, GridTradingStrategy};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the trade unlock password.
pub const UNLOCK_PASSWORD_ENV: &str = "PWD_UNLOCK";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Grid limits and position sizes
    pub grid_trading_strategy: GridStrategyConfig,
    /// Traded symbols and limit price adjustments
    #[serde(default)]
    pub instruments: InstrumentConfig,
    /// Broker gateway connection
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Polling loop behaviour
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Equity being grid-traded
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Amount added to BUY and subtracted from SELL limit prices so orders fill
    #[serde(default = "default_price_adjust")]
    pub price_adjust: Decimal,
    /// Price increment of the equity
    #[serde(default = "default_tick_size")]
    pub tick_size: Decimal,
    /// Inverse equity used as the hedge
    #[serde(default = "default_inverse_symbol", alias = "ie_symbol")]
    pub inverse_symbol: String,
    #[serde(default = "default_inverse_price_adjust", alias = "ie_price_adjust")]
    pub inverse_price_adjust: Decimal,
    #[serde(default = "default_tick_size")]
    pub inverse_tick_size: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the broker gateway
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    /// API key sent with every request
    #[serde(default)]
    pub api_key: String,
    /// Secret used to sign requests
    #[serde(default)]
    pub secret_key: String,
    /// Trade unlock password (falls back to `PWD_UNLOCK`)
    #[serde(default, skip_serializing)]
    pub unlock_password: String,
    /// HTTP timeout in seconds
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Log orders instead of submitting them
    #[serde(default)]
    pub dry_run: bool,
    /// Seconds between polling cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Seconds before the first fill check of a new order
    #[serde(default = "default_fill_check_delay")]
    pub fill_check_delay_secs: u64,
    /// Further seconds to wait before an unfilled order is a timeout
    #[serde(default = "default_order_fill_timeout")]
    pub order_fill_timeout_secs: u64,
    /// Stop the loop on fill timeouts and unfilled orders instead of logging them
    #[serde(default = "default_abort_on_fill_timeout")]
    pub abort_on_fill_timeout: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory of the daily rotated log files
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
    /// Log file name prefix
    #[serde(default = "default_log_file")]
    pub file_name: String,
    /// Default level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_symbol() -> String {
    "HK.07226".to_string()
}

fn default_inverse_symbol() -> String {
    "HK.07552".to_string()
}

fn default_price_adjust() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

fn default_inverse_price_adjust() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_tick_size() -> Decimal {
    Decimal::new(1, 3) // 0.001
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:11111".to_string()
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    10
}

fn default_fill_check_delay() -> u64 {
    1
}

fn default_order_fill_timeout() -> u64 {
    10
}

fn default_abort_on_fill_timeout() -> bool {
    true
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("/var/log/futu-grid-trading")
}

fn default_log_file() -> String {
    "futu-grid-trading.log".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a config file, `.env` and `GRID__*` variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path.as_ref();
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(config::Environment::default().separator("__").prefix("GRID"))
            .build()
            .with_context(|| format!("Failed to build configuration from {}", path.display()))?;

        let mut config: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if config.gateway.unlock_password.is_empty() {
            config.gateway.unlock_password =
                std::env::var(UNLOCK_PASSWORD_ENV).unwrap_or_default();
        }

        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        GridTradingStrategy::new(&self.grid_trading_strategy)
            .context("Invalid grid_trading_strategy")?;

        anyhow::ensure!(
            !self.instruments.symbol.is_empty() && !self.instruments.inverse_symbol.is_empty(),
            "symbol and inverse_symbol must be set"
        );

        anyhow::ensure!(
            self.instruments.symbol != self.instruments.inverse_symbol,
            "symbol and inverse_symbol must differ"
        );

        anyhow::ensure!(
            self.instruments.price_adjust >= Decimal::ZERO
                && self.instruments.inverse_price_adjust >= Decimal::ZERO,
            "price adjustments must not be negative"
        );

        anyhow::ensure!(
            self.instruments.tick_size > Decimal::ZERO
                && self.instruments.inverse_tick_size > Decimal::ZERO,
            "tick sizes must be greater than 0"
        );

        anyhow::ensure!(
            self.runtime.poll_interval_secs >= 1,
            "poll_interval_secs must be >= 1"
        );

        Ok(())
    }
}

impl RuntimeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fill_check_delay(&self) -> Duration {
        Duration::from_secs(self.fill_check_delay_secs)
    }

    pub fn order_fill_timeout(&self) -> Duration {
        Duration::from_secs(self.order_fill_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid_trading_strategy: GridStrategyConfig::default(),
            instruments: InstrumentConfig::default(),
            gateway: GatewayConfig::default(),
            runtime: RuntimeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            price_adjust: default_price_adjust(),
            tick_size: default_tick_size(),
            inverse_symbol: default_inverse_symbol(),
            inverse_price_adjust: default_inverse_price_adjust(),
            inverse_tick_size: default_tick_size(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            api_key: String::new(),
            secret_key: String::new(),
            unlock_password: String::new(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            poll_interval_secs: default_poll_interval(),
            fill_check_delay_secs: default_fill_check_delay(),
            order_fill_timeout_secs: default_order_fill_timeout(),
            abort_on_fill_timeout: default_abort_on_fill_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            file_name: default_log_file(),
            level: default_log_level(),
        }
    }
}
