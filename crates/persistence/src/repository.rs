//! High-level, application-specific interface to the database. Encapsulates
//! all SQL for Bot/Order/Position/SpreadSample/TradeLog/ExchangeAccount.
//!
//! Queries are runtime-checked (`sqlx::query`/`query_as::<_, T>()`) rather
//! than the `query!`/`query_as!` macros: those require either a live
//! `DATABASE_URL` or a checked-in `.sqlx` offline cache at compile time,
//! neither of which this repository ships.

use bot_types::{
    Bot, BotStatus, DcaLevel, ExchangeAccount, ExchangeName, LogLevel, Order, OrderSide,
    OrderStatus, OrderType, Position, PositionSide, ProfitMode, SpreadSample, TradeLog,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPool;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::DbError;

#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

#[derive(FromRow)]
struct BotRow {
    id: Uuid,
    user_id: Uuid,
    exchange_account_id: Uuid,
    bot_name: String,
    market1_symbol: String,
    market2_symbol: String,
    start_time: DateTime<Utc>,
    leverage: i32,
    order_type_open: String,
    order_type_close: String,
    investment_per_order: Decimal,
    max_position_value: Decimal,
    max_dca_times: i32,
    dca_config: JsonValue,
    profit_mode: String,
    profit_ratio: Decimal,
    stop_loss_ratio: Decimal,
    reverse_opening: bool,
    pause_after_close: bool,
    market1_start_price: Option<Decimal>,
    market2_start_price: Option<Decimal>,
    status: String,
    current_cycle: i32,
    current_dca_count: i32,
    last_trade_spread: Option<Decimal>,
    first_trade_spread: Option<Decimal>,
    total_profit: Decimal,
    total_trades: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BotRow> for Bot {
    type Error = DbError;

    fn try_from(row: BotRow) -> Result<Self, DbError> {
        let dca_config: Vec<DcaLevel> = serde_json::from_value(row.dca_config)?;
        Ok(Bot {
            id: row.id,
            user_id: row.user_id,
            exchange_account_id: row.exchange_account_id,
            bot_name: row.bot_name,
            market1_symbol: row.market1_symbol,
            market2_symbol: row.market2_symbol,
            start_time: row.start_time,
            leverage: row.leverage as u32,
            order_type_open: parse_order_type(&row.order_type_open),
            order_type_close: parse_order_type(&row.order_type_close),
            investment_per_order: row.investment_per_order,
            max_position_value: row.max_position_value,
            max_dca_times: row.max_dca_times as u32,
            dca_config,
            profit_mode: if row.profit_mode == "position" { ProfitMode::Position } else { ProfitMode::Regression },
            profit_ratio: row.profit_ratio,
            stop_loss_ratio: row.stop_loss_ratio,
            reverse_opening: row.reverse_opening,
            pause_after_close: row.pause_after_close,
            market1_start_price: row.market1_start_price,
            market2_start_price: row.market2_start_price,
            status: parse_bot_status(&row.status),
            current_cycle: row.current_cycle as u32,
            current_dca_count: row.current_dca_count as u32,
            last_trade_spread: row.last_trade_spread,
            first_trade_spread: row.first_trade_spread,
            total_profit: row.total_profit,
            total_trades: row.total_trades as u64,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_order_type(s: &str) -> OrderType {
    if s == "limit" {
        OrderType::Limit
    } else {
        OrderType::Market
    }
}

fn parse_bot_status(s: &str) -> BotStatus {
    match s {
        "running" => BotStatus::Running,
        "paused" => BotStatus::Paused,
        _ => BotStatus::Stopped,
    }
}

fn order_type_str(t: OrderType) -> &'static str {
    match t {
        OrderType::Market => "market",
        OrderType::Limit => "limit",
    }
}

fn bot_status_str(s: BotStatus) -> &'static str {
    match s {
        BotStatus::Stopped => "stopped",
        BotStatus::Running => "running",
        BotStatus::Paused => "paused",
    }
}

fn profit_mode_str(m: ProfitMode) -> &'static str {
    match m {
        ProfitMode::Regression => "regression",
        ProfitMode::Position => "position",
    }
}

impl DbRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---- bots ----------------------------------------------------------

    pub async fn create_bot(&self, bot: &Bot) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO bots (
                id, user_id, exchange_account_id, bot_name, market1_symbol, market2_symbol,
                start_time, leverage, order_type_open, order_type_close, investment_per_order,
                max_position_value, max_dca_times, dca_config, profit_mode, profit_ratio,
                stop_loss_ratio, reverse_opening, pause_after_close, market1_start_price,
                market2_start_price, status, current_cycle, current_dca_count,
                last_trade_spread, first_trade_spread, total_profit, total_trades,
                created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30
            )
            "#,
        )
        .bind(bot.id)
        .bind(bot.user_id)
        .bind(bot.exchange_account_id)
        .bind(&bot.bot_name)
        .bind(&bot.market1_symbol)
        .bind(&bot.market2_symbol)
        .bind(bot.start_time)
        .bind(bot.leverage as i32)
        .bind(order_type_str(bot.order_type_open))
        .bind(order_type_str(bot.order_type_close))
        .bind(bot.investment_per_order)
        .bind(bot.max_position_value)
        .bind(bot.max_dca_times as i32)
        .bind(serde_json::to_value(&bot.dca_config)?)
        .bind(profit_mode_str(bot.profit_mode))
        .bind(bot.profit_ratio)
        .bind(bot.stop_loss_ratio)
        .bind(bot.reverse_opening)
        .bind(bot.pause_after_close)
        .bind(bot.market1_start_price)
        .bind(bot.market2_start_price)
        .bind(bot_status_str(bot.status))
        .bind(bot.current_cycle as i32)
        .bind(bot.current_dca_count as i32)
        .bind(bot.last_trade_spread)
        .bind(bot.first_trade_spread)
        .bind(bot.total_profit)
        .bind(bot.total_trades as i64)
        .bind(bot.created_at)
        .bind(bot.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_bot(&self, bot_id: Uuid) -> Result<Bot, DbError> {
        let row = sqlx::query_as::<_, BotRow>("SELECT * FROM bots WHERE id = $1")
            .bind(bot_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)?;
        row.try_into()
    }

    pub async fn list_bots(&self) -> Result<Vec<Bot>, DbError> {
        let rows = sqlx::query_as::<_, BotRow>("SELECT * FROM bots ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Every bot whose `status` survives a process restart: Running and
    /// Paused bots are recovered, Stopped bots are not.
    pub async fn get_recoverable_bots(&self) -> Result<Vec<Bot>, DbError> {
        let rows = sqlx::query_as::<_, BotRow>("SELECT * FROM bots WHERE status IN ('running', 'paused')")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn update_bot_status(&self, bot_id: Uuid, status: BotStatus) -> Result<(), DbError> {
        sqlx::query("UPDATE bots SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(bot_status_str(status))
            .bind(bot_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_bot_baseline_prices(&self, bot_id: Uuid, market1_price: Decimal, market2_price: Decimal) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE bots SET market1_start_price = $1, market2_start_price = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(market1_price)
        .bind(market2_price)
        .bind(bot_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Updates the live counters the tick loop advances every cycle. Takes a
    /// single row lock rather than five separate statements.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_bot_counters(
        &self,
        bot_id: Uuid,
        current_cycle: u32,
        current_dca_count: u32,
        last_trade_spread: Option<Decimal>,
        first_trade_spread: Option<Decimal>,
        total_profit: Decimal,
        total_trades: u64,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE bots SET
                current_cycle = $1, current_dca_count = $2, last_trade_spread = $3,
                first_trade_spread = $4, total_profit = $5, total_trades = $6, updated_at = NOW()
            WHERE id = $7
            "#,
        )
        .bind(current_cycle as i32)
        .bind(current_dca_count as i32)
        .bind(last_trade_spread)
        .bind(first_trade_spread)
        .bind(total_profit)
        .bind(total_trades as i64)
        .bind(bot_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- exchange accounts ----------------------------------------------

    pub async fn get_exchange_account(&self, account_id: Uuid) -> Result<ExchangeAccount, DbError> {
        let row = sqlx::query("SELECT * FROM exchange_accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)?;

        let exchange_name: String = row.get("exchange_name");
        Ok(ExchangeAccount {
            id: row.get("id"),
            user_id: row.get("user_id"),
            exchange_name: ExchangeName::parse(&exchange_name).ok_or(DbError::NotFound)?,
            api_key: row.get("api_key"),
            api_secret: row.get("api_secret"),
            passphrase: row.get("passphrase"),
            is_testnet: row.get("is_testnet"),
            proxy_url: row.get("proxy_url"),
        })
    }

    // ---- orders ----------------------------------------------------------

    pub async fn create_order(&self, order: &Order) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, bot_id, cycle_number, dca_level, exchange_order_id, symbol, side,
                order_type, price, amount, filled_amount, cost, status, created_at,
                updated_at, filled_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(order.id)
        .bind(order.bot_id)
        .bind(order.cycle_number as i32)
        .bind(order.dca_level as i32)
        .bind(&order.exchange_order_id)
        .bind(&order.symbol)
        .bind(order_side_str(order.side))
        .bind(order_type_str(order.order_type))
        .bind(order.price)
        .bind(order.amount)
        .bind(order.filled_amount)
        .bind(order.cost)
        .bind(order_status_str(order.status))
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.filled_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_order_fill(&self, order_id: Uuid, filled_amount: Decimal, cost: Option<Decimal>, status: OrderStatus, filled_at: Option<DateTime<Utc>>) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE orders SET filled_amount = $1, cost = $2, status = $3, filled_at = $4, updated_at = NOW() WHERE id = $5",
        )
        .bind(filled_amount)
        .bind(cost)
        .bind(order_status_str(status))
        .bind(filled_at)
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_orders_for_cycle(&self, bot_id: Uuid, cycle_number: u32) -> Result<Vec<Order>, DbError> {
        let rows = sqlx::query("SELECT * FROM orders WHERE bot_id = $1 AND cycle_number = $2 ORDER BY created_at ASC")
            .bind(bot_id)
            .bind(cycle_number as i32)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_order).collect()
    }

    /// Orders the Data Reconciler still needs to poll: those not yet in a
    /// terminal state.
    pub async fn get_open_orders(&self, bot_id: Uuid) -> Result<Vec<Order>, DbError> {
        let rows = sqlx::query("SELECT * FROM orders WHERE bot_id = $1 AND status IN ('pending', 'open')")
            .bind(bot_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_order).collect()
    }

    // ---- positions ---------------------------------------------------------

    /// Applies a fill to a bot's position in `symbol`: same-side fills merge
    /// by weighted average, opposite
    /// side reduces the position (closing it once the remainder hits zero),
    /// and no existing position opens a new one. Runs inside a transaction so
    /// the read-then-write can't race another tick.
    pub async fn apply_fill(&self, bot_id: Uuid, cycle_number: u32, symbol: &str, fill_side: PositionSide, fill_amount: Decimal, fill_price: Decimal) -> Result<Position, DbError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT * FROM positions WHERE bot_id = $1 AND symbol = $2 AND is_open FOR UPDATE")
            .bind(bot_id)
            .bind(symbol)
            .fetch_optional(&mut *tx)
            .await?;

        let position = if let Some(row) = existing {
            let mut position = row_to_position(row)?;
            position.updated_at = Utc::now();
            if position.side == fill_side {
                position.merge_same_side(fill_amount, fill_price);
                sqlx::query("UPDATE positions SET amount = $1, entry_price = $2, updated_at = NOW() WHERE id = $3")
                    .bind(position.amount)
                    .bind(position.entry_price)
                    .bind(position.id)
                    .execute(&mut *tx)
                    .await?;
            } else if position.reduce_opposite_side(fill_amount, position.updated_at) {
                sqlx::query("UPDATE positions SET amount = 0, is_open = FALSE, closed_at = NOW(), updated_at = NOW() WHERE id = $1")
                    .bind(position.id)
                    .execute(&mut *tx)
                    .await?;
            } else {
                sqlx::query("UPDATE positions SET amount = $1, updated_at = NOW() WHERE id = $2")
                    .bind(position.amount)
                    .bind(position.id)
                    .execute(&mut *tx)
                    .await?;
            }
            position
        } else {
            let now = Utc::now();
            let position = Position {
                id: Uuid::new_v4(),
                bot_id,
                cycle_number,
                symbol: symbol.to_string(),
                side: fill_side,
                amount: fill_amount,
                entry_price: fill_price,
                current_price: Some(fill_price),
                unrealized_pnl: Some(Decimal::ZERO),
                is_open: true,
                created_at: now,
                updated_at: now,
                closed_at: None,
            };
            sqlx::query(
                r#"
                INSERT INTO positions (
                    id, bot_id, cycle_number, symbol, side, amount, entry_price,
                    current_price, unrealized_pnl, is_open, created_at, updated_at, closed_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(position.id)
            .bind(position.bot_id)
            .bind(position.cycle_number as i32)
            .bind(&position.symbol)
            .bind(position_side_str(position.side))
            .bind(position.amount)
            .bind(position.entry_price)
            .bind(position.current_price)
            .bind(position.unrealized_pnl)
            .bind(position.is_open)
            .bind(position.created_at)
            .bind(position.updated_at)
            .bind(position.closed_at)
            .execute(&mut *tx)
            .await?;
            position
        };

        tx.commit().await?;
        Ok(position)
    }

    /// Inserts a position discovered on the exchange but missing from the
    /// database (reconciliation).
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_position(&self, bot_id: Uuid, cycle_number: u32, symbol: &str, side: PositionSide, amount: Decimal, entry_price: Decimal, current_price: Option<Decimal>, unrealized_pnl: Option<Decimal>) -> Result<Position, DbError> {
        let now = Utc::now();
        let position = Position {
            id: Uuid::new_v4(),
            bot_id,
            cycle_number,
            symbol: symbol.to_string(),
            side,
            amount,
            entry_price,
            current_price,
            unrealized_pnl,
            is_open: true,
            created_at: now,
            updated_at: now,
            closed_at: None,
        };
        sqlx::query(
            r#"
            INSERT INTO positions (
                id, bot_id, cycle_number, symbol, side, amount, entry_price,
                current_price, unrealized_pnl, is_open, created_at, updated_at, closed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(position.id)
        .bind(position.bot_id)
        .bind(position.cycle_number as i32)
        .bind(&position.symbol)
        .bind(position_side_str(position.side))
        .bind(position.amount)
        .bind(position.entry_price)
        .bind(position.current_price)
        .bind(position.unrealized_pnl)
        .bind(position.is_open)
        .bind(position.created_at)
        .bind(position.updated_at)
        .bind(position.closed_at)
        .execute(&self.pool)
        .await?;
        Ok(position)
    }

    /// Highest `cycle_number` ever recorded for a bot, across open and closed
    /// positions; `0` if the bot has never had one.
    pub async fn get_max_cycle_number(&self, bot_id: Uuid) -> Result<u32, DbError> {
        let row = sqlx::query("SELECT COALESCE(MAX(cycle_number), 0) AS max_cycle FROM positions WHERE bot_id = $1")
            .bind(bot_id)
            .fetch_one(&self.pool)
            .await?;
        let max_cycle: i32 = row.get("max_cycle");
        Ok(max_cycle as u32)
    }

    pub async fn get_open_positions(&self, bot_id: Uuid) -> Result<Vec<Position>, DbError> {
        let rows = sqlx::query("SELECT * FROM positions WHERE bot_id = $1 AND is_open")
            .bind(bot_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_position).collect()
    }

    pub async fn update_position_prices(&self, position_id: Uuid, current_price: Decimal, unrealized_pnl: Decimal) -> Result<(), DbError> {
        sqlx::query("UPDATE positions SET current_price = $1, unrealized_pnl = $2, updated_at = NOW() WHERE id = $3")
            .bind(current_price)
            .bind(unrealized_pnl)
            .bind(position_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Overwrites a position's `amount` from the exchange's view of the world
    /// (Data Reconciler).
    pub async fn update_position_amount(&self, position_id: Uuid, amount: Decimal) -> Result<(), DbError> {
        sqlx::query("UPDATE positions SET amount = $1, updated_at = NOW() WHERE id = $2")
            .bind(amount)
            .bind(position_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Marks a single position closed without touching its siblings.
    pub async fn close_position(&self, position_id: Uuid) -> Result<(), DbError> {
        sqlx::query("UPDATE positions SET is_open = FALSE, closed_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(position_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Closes every open position for a bot inside one transaction, so a
    /// crash mid-close never leaves a half-closed cycle.
    pub async fn close_all_positions(&self, bot_id: Uuid) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE positions SET is_open = FALSE, closed_at = NOW(), updated_at = NOW() WHERE bot_id = $1 AND is_open")
            .bind(bot_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    // ---- spread history ----------------------------------------------------

    pub async fn record_spread_sample(&self, sample: &SpreadSample) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO spread_history (id, bot_id, market1_price, market2_price, spread_percentage, recorded_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(sample.id)
        .bind(sample.bot_id)
        .bind(sample.market1_price)
        .bind(sample.market2_price)
        .bind(sample.spread_percentage)
        .bind(sample.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_recent_spread_samples(&self, bot_id: Uuid, limit: i64) -> Result<Vec<SpreadSample>, DbError> {
        let rows = sqlx::query(
            "SELECT * FROM spread_history WHERE bot_id = $1 ORDER BY recorded_at DESC LIMIT $2",
        )
        .bind(bot_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(SpreadSample {
                    id: row.get("id"),
                    bot_id: row.get("bot_id"),
                    market1_price: row.get("market1_price"),
                    market2_price: row.get("market2_price"),
                    spread_percentage: row.get("spread_percentage"),
                    recorded_at: row.get("recorded_at"),
                })
            })
            .collect()
    }

    // ---- trade logs ---------------------------------------------------------

    pub async fn log_trade_event(&self, log: &TradeLog) -> Result<(), DbError> {
        sqlx::query("INSERT INTO trade_logs (id, bot_id, log_type, message, details, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(log.id)
            .bind(log.bot_id)
            .bind(log_level_str(log.log_type))
            .bind(&log.message)
            .bind(&log.details)
            .bind(log.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_trade_logs(&self, bot_id: Uuid, limit: i64) -> Result<Vec<TradeLog>, DbError> {
        let rows = sqlx::query("SELECT * FROM trade_logs WHERE bot_id = $1 ORDER BY created_at DESC LIMIT $2")
            .bind(bot_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let log_type: String = row.get("log_type");
                Ok(TradeLog {
                    id: row.get("id"),
                    bot_id: row.get("bot_id"),
                    log_type: parse_log_level(&log_type),
                    message: row.get("message"),
                    details: row.get("details"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}

fn order_side_str(s: OrderSide) -> &'static str {
    match s {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}

fn order_status_str(s: OrderStatus) -> &'static str {
    match s {
        OrderStatus::Pending => "pending",
        OrderStatus::Open => "open",
        OrderStatus::Closed => "closed",
        OrderStatus::Canceled => "canceled",
    }
}

fn position_side_str(s: PositionSide) -> &'static str {
    match s {
        PositionSide::Long => "long",
        PositionSide::Short => "short",
    }
}

fn log_level_str(l: LogLevel) -> &'static str {
    match l {
        LogLevel::Info => "info",
        LogLevel::Trade => "trade",
        LogLevel::Error => "error",
    }
}

fn parse_log_level(s: &str) -> LogLevel {
    match s {
        "trade" => LogLevel::Trade,
        "error" => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

fn row_to_order(row: sqlx::postgres::PgRow) -> Result<Order, DbError> {
    let side: String = row.get("side");
    let order_type: String = row.get("order_type");
    let status: String = row.get("status");
    Ok(Order {
        id: row.get("id"),
        bot_id: row.get("bot_id"),
        cycle_number: row.get::<i32, _>("cycle_number") as u32,
        dca_level: row.get::<i32, _>("dca_level") as u32,
        exchange_order_id: row.get("exchange_order_id"),
        symbol: row.get("symbol"),
        side: if side == "buy" { OrderSide::Buy } else { OrderSide::Sell },
        order_type: parse_order_type(&order_type),
        price: row.get("price"),
        amount: row.get("amount"),
        filled_amount: row.get("filled_amount"),
        cost: row.get("cost"),
        status: match status.as_str() {
            "open" => OrderStatus::Open,
            "closed" => OrderStatus::Closed,
            "canceled" => OrderStatus::Canceled,
            _ => OrderStatus::Pending,
        },
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        filled_at: row.get("filled_at"),
    })
}

fn row_to_position(row: sqlx::postgres::PgRow) -> Result<Position, DbError> {
    let side: String = row.get("side");
    Ok(Position {
        id: row.get("id"),
        bot_id: row.get("bot_id"),
        cycle_number: row.get::<i32, _>("cycle_number") as u32,
        symbol: row.get("symbol"),
        side: if side == "long" { PositionSide::Long } else { PositionSide::Short },
        amount: row.get("amount"),
        entry_price: row.get("entry_price"),
        current_price: row.get("current_price"),
        unrealized_pnl: row.get("unrealized_pnl"),
        is_open: row.get("is_open"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        closed_at: row.get("closed_at"),
    })
}
