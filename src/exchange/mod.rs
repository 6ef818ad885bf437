//! Brokerage integrations for grid trading.
//!
//! ## Gateway
//! REST access to an OpenD-style quote and trade gateway for:
//! - Market data (last price, trading session)
//! - Account operations (positions, orders, fill status)
//!
//! ## Mock
//! In-memory paper broker for dry runs and tests.

mod client;
pub mod mock;
mod traits;
mod types;

pub use client::GatewayClient;
pub use mock::MockBroker;
pub use traits::Brokerage;
pub use types::*;
