//! Binance USD-M futures adapter implementing [`exchange_port::ExchangePort`].

mod auth;
pub mod error;
pub mod rate_limit;

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use auth::sign_request;
use bot_types::{ExchangeName, OrderSide, OrderStatus, PositionSide};
use chrono::Utc;
use error::BinanceError;
use exchange_port::{
    credentials::ExchangeCredentials,
    error::ExchangeError,
    retry::{with_retry, RetryPolicy},
    types::{Balance, ExchangeOrder, ExchangePosition, Ticker},
    ExchangePort,
};
use rate_limit::RateLimitTracker;
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize};

pub struct BinanceClient {
    client: reqwest::Client,
    base_url: String,
    api_secret: String,
    rate_limit: RateLimitTracker,
}

impl BinanceClient {
    /// `credentials.is_testnet` picks the base URL; there is no production
    /// fallback if it's left unset because [`ExchangeCredentials`] has no
    /// `Default` and every call site must state it.
    pub fn new(credentials: ExchangeCredentials) -> Result<Self, ExchangeError> {
        if credentials.exchange != ExchangeName::Binance {
            return Err(ExchangeError::Decode("credentials are not for binance".into()));
        }
        let base_url = if credentials.is_testnet {
            "https://testnet.binancefuture.com".to_string()
        } else {
            "https://fapi.binance.com".to_string()
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            HeaderValue::from_str(&credentials.api_key).map_err(|e| ExchangeError::Auth(e.to_string()))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ExchangeError::Network { operation: "client build".into(), message: e.to_string() })?;

        Ok(Self { client, base_url, api_secret: credentials.api_secret, rate_limit: RateLimitTracker::new() })
    }

    fn timestamp_param(params: &mut BTreeMap<&str, String>) {
        let ts = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis();
        params.insert("timestamp", ts.to_string());
    }

    async fn get_signed<T: DeserializeOwned>(&self, path: &str, params: &mut BTreeMap<&str, String>) -> Result<T, BinanceError> {
        Self::timestamp_param(params);
        let query_string = serde_qs::to_string(params).unwrap();
        let signature = sign_request(&self.api_secret, &query_string);
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query_string, signature);
        self.send_signed(self.client.get(&url)).await
    }

    async fn post_signed<T: DeserializeOwned>(&self, path: &str, params: &mut BTreeMap<&str, String>) -> Result<T, BinanceError> {
        Self::timestamp_param(params);
        let query_string = serde_qs::to_string(params).unwrap();
        let signature = sign_request(&self.api_secret, &query_string);
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query_string, signature);
        self.send_signed(self.client.post(&url)).await
    }

    async fn delete_signed<T: DeserializeOwned>(&self, path: &str, params: &mut BTreeMap<&str, String>) -> Result<T, BinanceError> {
        Self::timestamp_param(params);
        let query_string = serde_qs::to_string(params).unwrap();
        let signature = sign_request(&self.api_secret, &query_string);
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query_string, signature);
        self.send_signed(self.client.delete(&url)).await
    }

    async fn get_ticker_once(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let url = format!("{}/fapi/v1/ticker/price", self.base_url);
        let price: PriceTickerResponse = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| ExchangeError::Network { operation: "get_ticker".into(), message: e.to_string() })?
            .json()
            .await
            .map_err(|e| ExchangeError::Decode(e.to_string()))?;

        let book_url = format!("{}/fapi/v1/ticker/bookTicker", self.base_url);
        let book: BookTickerResponse = self
            .client
            .get(&book_url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| ExchangeError::Network { operation: "get_ticker".into(), message: e.to_string() })?
            .json()
            .await
            .map_err(|e| ExchangeError::Decode(e.to_string()))?;

        Ok(Ticker {
            symbol: book.symbol,
            last: price.price,
            bid: book.bid_price,
            ask: book.ask_price,
            volume: Decimal::ZERO,
            ts: Utc::now(),
        })
    }

    async fn get_all_positions_once(&self) -> Result<Vec<ExchangePosition>, ExchangeError> {
        let mut params = BTreeMap::new();
        let rows: Vec<PositionRiskResponse> = self.get_signed("/fapi/v2/positionRisk", &mut params).await?;
        Ok(rows
            .into_iter()
            .filter(|r| !r.position_amt.is_zero())
            .map(|r| ExchangePosition {
                symbol: r.symbol,
                side: if r.position_amt > Decimal::ZERO { PositionSide::Long } else { PositionSide::Short },
                amount: r.position_amt.abs(),
                entry_price: r.entry_price,
                current_price: r.mark_price,
                unrealized_pnl: r.un_realized_profit,
            })
            .collect())
    }

    async fn set_leverage_once(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        params.insert("leverage", leverage.to_string());
        #[derive(Deserialize)]
        struct LeverageResponse {
            #[allow(dead_code)]
            leverage: u32,
        }
        let _: LeverageResponse = self.post_signed("/fapi/v1/leverage", &mut params).await?;
        Ok(())
    }

    async fn fetch_historical_price_once(&self, symbol: &str, ts_ms: i64) -> Result<Option<Decimal>, ExchangeError> {
        let url = format!("{}/fapi/v1/klines", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol.to_string()),
                ("interval", "5m".to_string()),
                ("startTime", (ts_ms - 5 * 60 * 1000).to_string()),
                ("endTime", (ts_ms + 5 * 60 * 1000).to_string()),
                ("limit", "3".to_string()),
            ])
            .send()
            .await
            .map_err(|e| ExchangeError::Network { operation: "fetch_historical_price".into(), message: e.to_string() })?
            .json::<Vec<RawKline>>()
            .await
            .map_err(|e| ExchangeError::Decode(e.to_string()))?;

        let nearest = response.into_iter().min_by_key(|k| (k.0 - ts_ms).abs());
        match nearest {
            Some(k) => Decimal::from_str(&k.4).map(Some).map_err(|e| ExchangeError::Decode(e.to_string())),
            None => Ok(None),
        }
    }

    async fn send_signed<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T, BinanceError> {
        let response = builder.send().await?;
        self.rate_limit.update_from_headers(response.headers());
        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| BinanceError::Deserialization(e.to_string()))
        } else {
            let err: ApiErrorResponse = serde_json::from_str(&text)
                .map_err(|e| BinanceError::Deserialization(format!("{e}: {text}")))?;
            Err(BinanceError::Api(err.code, err.msg))
        }
    }
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    code: i64,
    msg: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    symbol: String,
    side: String,
    status: String,
    price: Decimal,
    orig_qty: Decimal,
    executed_qty: Decimal,
    cum_quote: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRiskResponse {
    symbol: String,
    position_amt: Decimal,
    entry_price: Decimal,
    mark_price: Decimal,
    un_realized_profit: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceResponseRow {
    asset: String,
    balance: Decimal,
    available_balance: Decimal,
}

#[derive(Deserialize)]
struct BookTickerResponse {
    symbol: String,
    #[serde(rename = "bidPrice")]
    bid_price: Decimal,
    #[serde(rename = "askPrice")]
    ask_price: Decimal,
}

#[derive(Deserialize)]
struct PriceTickerResponse {
    price: Decimal,
}

#[derive(Deserialize)]
struct RawKline(i64, String, String, String, String, String, i64, String, i64, String, String, String);

fn map_order_status(binance_status: &str) -> OrderStatus {
    match binance_status {
        "NEW" | "PARTIALLY_FILLED" => OrderStatus::Open,
        "FILLED" => OrderStatus::Closed,
        "CANCELED" | "EXPIRED" | "REJECTED" => OrderStatus::Canceled,
        _ => OrderStatus::Pending,
    }
}

fn side_to_binance(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

fn binance_to_side(s: &str) -> Result<OrderSide, BinanceError> {
    match s {
        "BUY" => Ok(OrderSide::Buy),
        "SELL" => Ok(OrderSide::Sell),
        other => Err(BinanceError::InvalidData(format!("unknown side {other}"))),
    }
}

#[async_trait]
impl ExchangePort for BinanceClient {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        with_retry(RetryPolicy::reads(), || self.get_ticker_once(symbol)).await
    }

    async fn create_market_order(&self, symbol: &str, side: OrderSide, amount: Decimal, reduce_only: bool) -> Result<ExchangeOrder, ExchangeError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        params.insert("side", side_to_binance(side).to_string());
        params.insert("type", "MARKET".to_string());
        params.insert("quantity", amount.to_string());
        if reduce_only {
            params.insert("reduceOnly", "true".to_string());
        }
        let resp: OrderResponse = self.post_signed("/fapi/v1/order", &mut params).await?;
        order_response_to_exchange_order(resp)
    }

    async fn create_limit_order(&self, symbol: &str, side: OrderSide, amount: Decimal, price: Decimal, reduce_only: bool) -> Result<ExchangeOrder, ExchangeError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        params.insert("side", side_to_binance(side).to_string());
        params.insert("type", "LIMIT".to_string());
        params.insert("timeInForce", "GTC".to_string());
        params.insert("quantity", amount.to_string());
        params.insert("price", price.to_string());
        if reduce_only {
            params.insert("reduceOnly", "true".to_string());
        }
        let resp: OrderResponse = self.post_signed("/fapi/v1/order", &mut params).await?;
        order_response_to_exchange_order(resp)
    }

    async fn get_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ExchangeError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        params.insert("orderId", order_id.to_string());
        let resp: OrderResponse = self.get_signed("/fapi/v1/order", &mut params).await?;
        order_response_to_exchange_order(resp)
    }

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<(), ExchangeError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        params.insert("orderId", order_id.to_string());
        let _: serde_json::Value = match self.delete_signed("/fapi/v1/order", &mut params).await {
            Ok(v) => v,
            // already-terminal orders return "Unknown order sent" — treat as a no-op.
            Err(BinanceError::Api(-2011, _)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        Ok(())
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<ExchangePosition>, ExchangeError> {
        let positions = self.get_all_positions().await?;
        Ok(positions.into_iter().find(|p| p.symbol == symbol))
    }

    async fn get_all_positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError> {
        with_retry(RetryPolicy::reads(), || self.get_all_positions_once()).await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        with_retry(RetryPolicy::leverage(), || self.set_leverage_once(symbol, leverage)).await
    }

    async fn get_balance(&self) -> Result<Vec<Balance>, ExchangeError> {
        let mut params = BTreeMap::new();
        let rows: Vec<BalanceResponseRow> = self.get_signed("/fapi/v2/balance", &mut params).await?;
        Ok(rows
            .into_iter()
            .map(|r| Balance { asset: r.asset, free: r.available_balance, used: r.balance - r.available_balance, total: r.balance })
            .collect())
    }

    async fn fetch_historical_price(&self, symbol: &str, ts_ms: i64) -> Result<Option<Decimal>, ExchangeError> {
        with_retry(RetryPolicy::reads(), || self.fetch_historical_price_once(symbol, ts_ms)).await
    }

    async fn close(&self) {}
}

fn order_response_to_exchange_order(resp: OrderResponse) -> Result<ExchangeOrder, ExchangeError> {
    Ok(ExchangeOrder {
        exchange_order_id: resp.order_id.to_string(),
        symbol: resp.symbol,
        side: binance_to_side(&resp.side).map_err(ExchangeError::from)?,
        status: map_order_status(&resp.status),
        price: if resp.price.is_zero() { None } else { Some(resp.price) },
        requested_amount: resp.orig_qty,
        filled_amount: resp.executed_qty,
        cost: resp.cum_quote,
    })
}

pub struct BinanceAdapterBuilder;

impl exchange_port::factory::AdapterBuilder for BinanceAdapterBuilder {
    fn name(&self) -> &'static str {
        "binance"
    }

    fn build(&self, credentials: ExchangeCredentials) -> Result<std::sync::Arc<dyn ExchangePort>, ExchangeError> {
        Ok(std::sync::Arc::new(BinanceClient::new(credentials)?))
    }
}
