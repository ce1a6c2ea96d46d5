//! Deterministic in-memory Exchange Port used for tests and demo bots.
//! Seeded per-symbol prices, simulated fills at the quoted price, an
//! in-memory order book and position map. Fills are always complete (no
//! partial fills) and prices only move when [`MockExchange::set_price`] is
//! called — real randomness belongs in a test harness, not baked into the
//! adapter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bot_types::{OrderSide, OrderStatus, PositionSide};
use chrono::Utc;
use exchange_port::{
    error::ExchangeError,
    types::{Balance, ExchangeOrder, ExchangePosition, Ticker},
    ExchangePort,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

struct MockPosition {
    side: PositionSide,
    amount: Decimal,
    entry_price: Decimal,
}

pub struct MockExchange {
    prices: Mutex<HashMap<String, Decimal>>,
    positions: Mutex<HashMap<String, MockPosition>>,
    order_counter: AtomicU64,
    leverage: Mutex<HashMap<String, u32>>,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            order_counter: AtomicU64::new(10_000),
            leverage: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the last price for `symbol`, seeding it if unseen. Tests use this
    /// to drive the spread across an open/scale-in/close sequence.
    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().await.insert(symbol.to_string(), price);
    }

    async fn price_of(&self, symbol: &str) -> Decimal {
        let mut prices = self.prices.lock().await;
        *prices.entry(symbol.to_string()).or_insert(Decimal::ONE_HUNDRED)
    }

    fn next_order_id(&self) -> String {
        self.order_counter.fetch_add(1, Ordering::SeqCst).to_string()
    }

    async fn fill_at_market(&self, symbol: &str, side: OrderSide, amount: Decimal, reduce_only: bool) -> Result<ExchangeOrder, ExchangeError> {
        let price = self.price_of(symbol).await;
        let mut positions = self.positions.lock().await;

        match positions.get_mut(symbol) {
            Some(existing) if existing.side == PositionSide::from_order_side(side) => {
                if reduce_only {
                    return Err(ExchangeError::OrderRejected("reduce_only order would increase position".into()));
                }
                let total = existing.amount + amount;
                existing.entry_price = (existing.amount * existing.entry_price + amount * price) / total;
                existing.amount = total;
            }
            Some(existing) => {
                if amount >= existing.amount {
                    let remainder = amount - existing.amount;
                    if remainder.is_zero() {
                        positions.remove(symbol);
                    } else {
                        *existing = MockPosition { side: PositionSide::from_order_side(side), amount: remainder, entry_price: price };
                    }
                } else {
                    existing.amount -= amount;
                }
            }
            None => {
                if reduce_only {
                    return Err(ExchangeError::OrderRejected("reduce_only order with no existing position".into()));
                }
                positions.insert(symbol.to_string(), MockPosition { side: PositionSide::from_order_side(side), amount, entry_price: price });
            }
        }

        Ok(ExchangeOrder {
            exchange_order_id: self.next_order_id(),
            symbol: symbol.to_string(),
            side,
            status: OrderStatus::Closed,
            price: Some(price),
            requested_amount: amount,
            filled_amount: amount,
            cost: amount * price,
        })
    }
}

#[async_trait]
impl ExchangePort for MockExchange {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let price = self.price_of(symbol).await;
        let spread = price * Decimal::new(1, 4); // 0.0001 = 1bp
        Ok(Ticker { symbol: symbol.to_string(), last: price, bid: price - spread, ask: price + spread, volume: Decimal::ZERO, ts: Utc::now() })
    }

    async fn create_market_order(&self, symbol: &str, side: OrderSide, amount: Decimal, reduce_only: bool) -> Result<ExchangeOrder, ExchangeError> {
        self.fill_at_market(symbol, side, amount, reduce_only).await
    }

    async fn create_limit_order(&self, symbol: &str, side: OrderSide, amount: Decimal, _price: Decimal, reduce_only: bool) -> Result<ExchangeOrder, ExchangeError> {
        self.fill_at_market(symbol, side, amount, reduce_only).await
    }

    async fn get_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ExchangeError> {
        let price = self.price_of(symbol).await;
        Ok(ExchangeOrder {
            exchange_order_id: order_id.to_string(),
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            status: OrderStatus::Closed,
            price: Some(price),
            requested_amount: Decimal::ZERO,
            filled_amount: Decimal::ZERO,
            cost: Decimal::ZERO,
        })
    }

    async fn cancel_order(&self, _order_id: &str, _symbol: &str) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<ExchangePosition>, ExchangeError> {
        let positions = self.positions.lock().await;
        let price = self.price_of(symbol).await;
        Ok(positions.get(symbol).map(|p| to_exchange_position(symbol, p, price)))
    }

    async fn get_all_positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError> {
        let positions = self.positions.lock().await;
        let mut out = Vec::with_capacity(positions.len());
        for (symbol, p) in positions.iter() {
            let price = self.price_of(symbol).await;
            out.push(to_exchange_position(symbol, p, price));
        }
        Ok(out)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        self.leverage.lock().await.insert(symbol.to_string(), leverage);
        Ok(())
    }

    async fn get_balance(&self) -> Result<Vec<Balance>, ExchangeError> {
        Ok(vec![Balance { asset: "USDT".to_string(), free: Decimal::new(100_000, 0), used: Decimal::ZERO, total: Decimal::new(100_000, 0) }])
    }

    async fn fetch_historical_price(&self, symbol: &str, _ts_ms: i64) -> Result<Option<Decimal>, ExchangeError> {
        Ok(Some(self.price_of(symbol).await))
    }

    async fn close(&self) {}
}

pub struct MockAdapterBuilder;

impl exchange_port::factory::AdapterBuilder for MockAdapterBuilder {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn build(&self, _credentials: exchange_port::credentials::ExchangeCredentials) -> Result<std::sync::Arc<dyn ExchangePort>, ExchangeError> {
        Ok(std::sync::Arc::new(MockExchange::new()))
    }
}

fn to_exchange_position(symbol: &str, p: &MockPosition, current_price: Decimal) -> ExchangePosition {
    let unrealized_pnl = match p.side {
        PositionSide::Long => (current_price - p.entry_price) * p.amount,
        PositionSide::Short => (p.entry_price - current_price) * p.amount,
    };
    ExchangePosition { symbol: symbol.to_string(), side: p.side, amount: p.amount, entry_price: p.entry_price, current_price, unrealized_pnl }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn opens_and_scales_position_with_vwap() {
        let exchange = MockExchange::new();
        exchange.set_price("BTCUSDT", dec!(100)).await;
        exchange.create_market_order("BTCUSDT", OrderSide::Buy, dec!(10), false).await.unwrap();
        exchange.set_price("BTCUSDT", dec!(110)).await;
        exchange.create_market_order("BTCUSDT", OrderSide::Buy, dec!(10), false).await.unwrap();

        let position = exchange.get_position("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(position.amount, dec!(20));
        assert_eq!(position.entry_price, dec!(105));
    }

    #[tokio::test]
    async fn reduce_only_rejected_without_position() {
        let exchange = MockExchange::new();
        exchange.set_price("BTCUSDT", dec!(100)).await;
        let result = exchange.create_market_order("BTCUSDT", OrderSide::Sell, dec!(1), true).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn closing_trade_reduces_then_removes_position() {
        let exchange = MockExchange::new();
        exchange.set_price("BTCUSDT", dec!(100)).await;
        exchange.create_market_order("BTCUSDT", OrderSide::Buy, dec!(5), false).await.unwrap();
        exchange.create_market_order("BTCUSDT", OrderSide::Sell, dec!(5), true).await.unwrap();
        assert!(exchange.get_position("BTCUSDT").await.unwrap().is_none());
    }
}
