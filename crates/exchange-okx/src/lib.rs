//! OKX v5 REST adapter. Header-based HMAC signing, the `posSide` long/short
//! convention for reduce-only vs opening orders, and cross-margin as the
//! only mode this trading style needs.

pub mod auth;
pub mod error;

use async_trait::async_trait;
use bot_types::{ExchangeName, OrderSide, OrderStatus, PositionSide};
use chrono::Utc;
use error::OkxError;
use exchange_port::{
    credentials::ExchangeCredentials,
    error::ExchangeError,
    retry::{with_retry, RetryPolicy},
    types::{Balance, ExchangeOrder, ExchangePosition, Ticker},
    ExchangePort,
};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

const BASE_URL: &str = "https://www.okx.com";

pub struct OkxClient {
    client: reqwest::Client,
    api_key: String,
    api_secret: String,
    passphrase: String,
    is_demo: bool,
}

impl OkxClient {
    pub fn new(credentials: ExchangeCredentials) -> Result<Self, ExchangeError> {
        if credentials.exchange != ExchangeName::Okx {
            return Err(ExchangeError::Auth("credentials are not for the okx adapter".into()));
        }
        let passphrase = credentials
            .passphrase
            .clone()
            .ok_or_else(|| ExchangeError::Auth("okx requires an api passphrase".into()))?;

        let mut builder = reqwest::Client::builder();
        if let Some(proxy_url) = &credentials.proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url).map_err(OkxError::RequestBuild)?);
        }
        let client = builder.build().map_err(OkxError::RequestBuild)?;

        Ok(Self { client, api_key: credentials.api_key, api_secret: credentials.api_secret, passphrase, is_demo: credentials.is_testnet })
    }

    async fn send_signed<T: for<'de> Deserialize<'de>>(&self, method: Method, path: &str, query: &str, body: Value) -> Result<Vec<T>, ExchangeError> {
        let body_str = if body.is_null() { String::new() } else { body.to_string() };
        let request_path = if query.is_empty() { path.to_string() } else { format!("{path}?{query}") };
        let timestamp = auth::timestamp();
        let signature = auth::sign_request(&self.api_secret, &timestamp, method.as_str(), &request_path, &body_str);

        let url = format!("{BASE_URL}{request_path}");
        let mut request = self
            .client
            .request(method, &url)
            .header("OK-ACCESS-KEY", &self.api_key)
            .header("OK-ACCESS-SIGN", signature)
            .header("OK-ACCESS-TIMESTAMP", &timestamp)
            .header("OK-ACCESS-PASSPHRASE", &self.passphrase)
            .header("Content-Type", "application/json");

        if self.is_demo {
            request = request.header("x-simulated-trading", "1");
        }
        if !body_str.is_empty() {
            request = request.body(body_str);
        }

        let response = request.send().await.map_err(OkxError::RequestBuild)?;
        let envelope: Envelope<T> = response.json().await.map_err(|e| OkxError::Deserialization(e.to_string()))?;

        if envelope.code != "0" {
            return Err(OkxError::Api { code: envelope.code, message: envelope.msg }.into());
        }
        Ok(envelope.data)
    }

    async fn get_one<T: for<'de> Deserialize<'de>>(&self, path: &str, query: &str) -> Result<T, ExchangeError> {
        let mut rows: Vec<T> = self.send_signed(Method::GET, path, query, Value::Null).await?;
        rows.pop().ok_or_else(|| OkxError::EmptyData.into())
    }

    async fn get_ticker_once(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let row: TickerRow = self.get_one("/api/v5/market/ticker", &format!("instId={symbol}")).await?;
        Ok(Ticker {
            symbol: row.inst_id,
            last: parse_decimal(&row.last),
            bid: parse_decimal(&row.bid_px),
            ask: parse_decimal(&row.ask_px),
            volume: parse_decimal(&row.vol_24h),
            ts: Utc::now(),
        })
    }

    async fn get_all_positions_once(&self) -> Result<Vec<ExchangePosition>, ExchangeError> {
        let rows: Vec<PositionRow> = self.send_signed(Method::GET, "/api/v5/account/positions", "", Value::Null).await?;
        Ok(rows.into_iter().filter(|r| !parse_decimal(&r.pos).is_zero()).map(position_row_to_exchange_position).collect())
    }

    async fn set_leverage_once(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        let body = json!({ "instId": symbol, "lever": leverage.to_string(), "mgnMode": "cross" });
        let _: Vec<Value> = self.send_signed(Method::POST, "/api/v5/account/set-leverage", "", body).await?;
        Ok(())
    }

    async fn fetch_historical_price_once(&self, symbol: &str, ts_ms: i64) -> Result<Option<Decimal>, ExchangeError> {
        let query = format!("instId={symbol}&bar=5m&after={}&limit=5", ts_ms + 300_000);
        let rows: Vec<[String; 6]> = self.send_signed(Method::GET, "/api/v5/market/history-candles", &query, Value::Null).await?;
        let closest = rows.into_iter().min_by_key(|candle| {
            candle[0].parse::<i64>().map(|candle_ts| (candle_ts - ts_ms).abs()).unwrap_or(i64::MAX)
        });
        Ok(closest.map(|candle| parse_decimal(&candle[4])))
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    code: String,
    msg: String,
    #[serde(default)]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct TickerRow {
    #[serde(rename = "instId")]
    inst_id: String,
    last: String,
    #[serde(rename = "bidPx")]
    bid_px: String,
    #[serde(rename = "askPx")]
    ask_px: String,
    #[serde(rename = "vol24h")]
    vol_24h: String,
}

#[derive(Deserialize)]
struct OrderRow {
    #[serde(rename = "ordId")]
    ord_id: String,
    #[serde(rename = "instId")]
    inst_id: String,
    side: String,
    state: String,
    px: String,
    sz: String,
    #[serde(rename = "accFillSz")]
    acc_fill_sz: String,
}

#[derive(Deserialize)]
struct PositionRow {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "posSide")]
    pos_side: String,
    pos: String,
    #[serde(rename = "avgPx")]
    avg_px: String,
    #[serde(rename = "markPx")]
    mark_px: String,
    #[serde(rename = "upl")]
    upl: String,
}

#[derive(Deserialize)]
struct BalanceDetailRow {
    ccy: String,
    #[serde(rename = "availBal")]
    avail_bal: String,
    #[serde(rename = "frozenBal")]
    frozen_bal: String,
    #[serde(rename = "eq")]
    eq: String,
}

#[derive(Deserialize)]
struct BalanceRow {
    details: Vec<BalanceDetailRow>,
}

fn parse_decimal(s: &str) -> Decimal {
    s.parse().unwrap_or(Decimal::ZERO)
}

fn side_to_okx(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}

fn pos_side_for(side: OrderSide, reduce_only: bool) -> &'static str {
    match (side, reduce_only) {
        (OrderSide::Buy, false) | (OrderSide::Sell, true) => "long",
        (OrderSide::Sell, false) | (OrderSide::Buy, true) => "short",
    }
}

fn map_order_state(state: &str) -> OrderStatus {
    match state {
        "live" => OrderStatus::Open,
        "filled" => OrderStatus::Closed,
        "canceled" => OrderStatus::Canceled,
        _ => OrderStatus::Pending,
    }
}

fn order_row_to_exchange_order(row: OrderRow) -> ExchangeOrder {
    let filled_amount = parse_decimal(&row.acc_fill_sz);
    let price = parse_decimal(&row.px);
    ExchangeOrder {
        exchange_order_id: row.ord_id,
        symbol: row.inst_id,
        side: if row.side == "buy" { OrderSide::Buy } else { OrderSide::Sell },
        status: map_order_state(&row.state),
        price: if price.is_zero() { None } else { Some(price) },
        requested_amount: parse_decimal(&row.sz),
        filled_amount,
        cost: filled_amount * price,
    }
}

#[async_trait]
impl ExchangePort for OkxClient {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        with_retry(RetryPolicy::reads(), || self.get_ticker_once(symbol)).await
    }

    async fn create_market_order(&self, symbol: &str, side: OrderSide, amount: Decimal, reduce_only: bool) -> Result<ExchangeOrder, ExchangeError> {
        let body = json!({
            "instId": symbol,
            "tdMode": "cross",
            "side": side_to_okx(side),
            "ordType": "market",
            "sz": amount.to_string(),
            "posSide": pos_side_for(side, reduce_only),
        });
        let rows: Vec<OrderRow> = self.send_signed(Method::POST, "/api/v5/trade/order", "", body).await?;
        rows.into_iter().next().map(order_row_to_exchange_order).ok_or_else(|| OkxError::EmptyData.into())
    }

    async fn create_limit_order(&self, symbol: &str, side: OrderSide, amount: Decimal, price: Decimal, reduce_only: bool) -> Result<ExchangeOrder, ExchangeError> {
        let body = json!({
            "instId": symbol,
            "tdMode": "cross",
            "side": side_to_okx(side),
            "ordType": "limit",
            "sz": amount.to_string(),
            "px": price.to_string(),
            "posSide": pos_side_for(side, reduce_only),
        });
        let rows: Vec<OrderRow> = self.send_signed(Method::POST, "/api/v5/trade/order", "", body).await?;
        rows.into_iter().next().map(order_row_to_exchange_order).ok_or_else(|| OkxError::EmptyData.into())
    }

    async fn get_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ExchangeError> {
        let row: OrderRow = self.get_one("/api/v5/trade/order", &format!("instId={symbol}&ordId={order_id}")).await?;
        Ok(order_row_to_exchange_order(row))
    }

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<(), ExchangeError> {
        let body = json!({ "instId": symbol, "ordId": order_id });
        let _: Vec<Value> = self.send_signed(Method::POST, "/api/v5/trade/cancel-order", "", body).await?;
        Ok(())
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<ExchangePosition>, ExchangeError> {
        let rows: Vec<PositionRow> = self.send_signed(Method::GET, "/api/v5/account/positions", &format!("instId={symbol}"), Value::Null).await?;
        Ok(rows.into_iter().find(|r| !parse_decimal(&r.pos).is_zero()).map(position_row_to_exchange_position))
    }

    async fn get_all_positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError> {
        with_retry(RetryPolicy::reads(), || self.get_all_positions_once()).await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        with_retry(RetryPolicy::leverage(), || self.set_leverage_once(symbol, leverage)).await
    }

    async fn get_balance(&self) -> Result<Vec<Balance>, ExchangeError> {
        let rows: Vec<BalanceRow> = self.send_signed(Method::GET, "/api/v5/account/balance", "", Value::Null).await?;
        Ok(rows
            .into_iter()
            .flat_map(|row| row.details)
            .map(|d| Balance { asset: d.ccy, free: parse_decimal(&d.avail_bal), used: parse_decimal(&d.frozen_bal), total: parse_decimal(&d.eq) })
            .collect())
    }

    async fn fetch_historical_price(&self, symbol: &str, ts_ms: i64) -> Result<Option<Decimal>, ExchangeError> {
        with_retry(RetryPolicy::reads(), || self.fetch_historical_price_once(symbol, ts_ms)).await
    }

    async fn close(&self) {}
}

fn position_row_to_exchange_position(row: PositionRow) -> ExchangePosition {
    let side = if row.pos_side == "long" { PositionSide::Long } else { PositionSide::Short };
    ExchangePosition {
        symbol: row.inst_id,
        side,
        amount: parse_decimal(&row.pos).abs(),
        entry_price: parse_decimal(&row.avg_px),
        current_price: parse_decimal(&row.mark_px),
        unrealized_pnl: parse_decimal(&row.upl),
    }
}

pub struct OkxAdapterBuilder;

impl exchange_port::factory::AdapterBuilder for OkxAdapterBuilder {
    fn name(&self) -> &'static str {
        "okx"
    }

    fn build(&self, credentials: ExchangeCredentials) -> Result<std::sync::Arc<dyn ExchangePort>, ExchangeError> {
        Ok(std::sync::Arc::new(OkxClient::new(credentials)?))
    }
}
