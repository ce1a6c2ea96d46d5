//! Per-engine TTL cache of last ticker price per symbol. Never shared across
//! engines — each `BotEngine` owns one.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::retry::{with_retry, RetryPolicy};
use crate::{error::ExchangeError, ExchangePort};

pub struct PriceCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Decimal, Instant)>>,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(5))
    }

    /// Returns the cached last price if fresher than the TTL, otherwise
    /// refetches through `port` and stores the result.
    pub async fn get(&self, port: &dyn ExchangePort, symbol: &str) -> Result<Decimal, ExchangeError> {
        {
            let entries = self.entries.lock().await;
            if let Some((price, fetched_at)) = entries.get(symbol) {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(*price);
                }
            }
        }
        let ticker = with_retry(RetryPolicy::reads(), || port.get_ticker(symbol)).await?;
        let mut entries = self.entries.lock().await;
        entries.insert(symbol.to_string(), (ticker.last, Instant::now()));
        Ok(ticker.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Balance, ExchangeOrder, ExchangePosition, Ticker};
    use async_trait::async_trait;
    use bot_types::OrderSide;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingPort {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ExchangePort for CountingPort {
        async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Ticker { symbol: symbol.to_string(), last: dec!(100), bid: dec!(99), ask: dec!(101), volume: dec!(0), ts: Utc::now() })
        }
        async fn create_market_order(&self, _: &str, _: OrderSide, _: Decimal, _: bool) -> Result<ExchangeOrder, ExchangeError> {
            unimplemented!()
        }
        async fn create_limit_order(&self, _: &str, _: OrderSide, _: Decimal, _: Decimal, _: bool) -> Result<ExchangeOrder, ExchangeError> {
            unimplemented!()
        }
        async fn get_order(&self, _: &str, _: &str) -> Result<ExchangeOrder, ExchangeError> {
            unimplemented!()
        }
        async fn cancel_order(&self, _: &str, _: &str) -> Result<(), ExchangeError> {
            unimplemented!()
        }
        async fn get_position(&self, _: &str) -> Result<Option<ExchangePosition>, ExchangeError> {
            unimplemented!()
        }
        async fn get_all_positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError> {
            unimplemented!()
        }
        async fn set_leverage(&self, _: &str, _: u32) -> Result<(), ExchangeError> {
            unimplemented!()
        }
        async fn get_balance(&self) -> Result<Vec<Balance>, ExchangeError> {
            unimplemented!()
        }
        async fn fetch_historical_price(&self, _: &str, _: i64) -> Result<Option<Decimal>, ExchangeError> {
            unimplemented!()
        }
        async fn close(&self) {}
    }

    #[tokio::test]
    async fn collapses_read_bursts_within_ttl() {
        let port = CountingPort { calls: AtomicU32::new(0) };
        let cache = PriceCache::new(Duration::from_millis(50));
        cache.get(&port, "BTCUSDT").await.unwrap();
        cache.get(&port, "BTCUSDT").await.unwrap();
        assert_eq!(port.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refetches_after_ttl_expires() {
        let port = CountingPort { calls: AtomicU32::new(0) };
        let cache = PriceCache::new(Duration::from_millis(10));
        cache.get(&port, "BTCUSDT").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.get(&port, "BTCUSDT").await.unwrap();
        assert_eq!(port.calls.load(Ordering::SeqCst), 2);
    }
}
