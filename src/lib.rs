//! # Futu Grid Trading
//!
//! Grid trading bot for a Hong Kong listed equity and its inverse equity.
//! As price climbs the grid the equity position is sold down and the
//! inverse equity hedge is built up, and the reverse on the way down.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `strategy`: Grid table, target position resolution, order execution
//! - `exchange`: Broker gateway client and in-memory paper broker
//! - `bot`: Polling loop tying the broker to the strategy
//! - `utils`: Shared utilities and decimal arithmetic

pub mod bot;
pub mod config;
pub mod exchange;
pub mod strategy;
pub mod utils;

pub use config::Config;
