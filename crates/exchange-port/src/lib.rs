//! The Exchange Port capability abstraction: every trading venue — real,
//! sandbox, or mock — is a plugin satisfying [`ExchangePort`]. Adapters
//! live in their own crates (`exchange-binance`, `exchange-okx`, `exchange-mock`)
//! and are instantiated through [`factory::create`].

pub mod credentials;
pub mod error;
pub mod factory;
pub mod price_cache;
pub mod retry;
pub mod types;

pub use credentials::ExchangeCredentials;
pub use error::ExchangeError;
pub use types::{Balance, ExchangeOrder, ExchangePosition, Ticker};

use async_trait::async_trait;
use bot_types::{OrderSide, OrderType};
use rust_decimal::Decimal;

/// Capability abstraction over a trading venue.
#[async_trait]
pub trait ExchangePort: Send + Sync {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;

    async fn create_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
        reduce_only: bool,
    ) -> Result<ExchangeOrder, ExchangeError>;

    async fn create_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        reduce_only: bool,
    ) -> Result<ExchangeOrder, ExchangeError>;

    async fn get_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ExchangeError>;

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<(), ExchangeError>;

    async fn get_position(&self, symbol: &str) -> Result<Option<ExchangePosition>, ExchangeError>;

    async fn get_all_positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError>;

    async fn get_balance(&self) -> Result<Vec<Balance>, ExchangeError>;

    /// Close price of the 5-minute candle nearest `ts_ms`; `None` if unavailable.
    async fn fetch_historical_price(&self, symbol: &str, ts_ms: i64) -> Result<Option<Decimal>, ExchangeError>;

    async fn close(&self);
}

/// Marker used by `order_type_open`/`order_type_close` on a Bot to pick which
/// `ExchangePort` creation method the engine calls.
pub fn order_type_requires_price(order_type: OrderType) -> bool {
    matches!(order_type, OrderType::Limit)
}
