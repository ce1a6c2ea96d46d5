//! One instance per running bot. Owns the bot's exchange client, persistence
//! handle, price cache, and the `is_running` flag the Manager flips to stop
//! or pause it. Runs a per-bot reconcile-then-tick state machine.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bot_types::{
    Bot, BotId, BotStatus, LogLevel, Order, OrderSide, OrderStatus, OrderType, Position,
    PositionSide, ProfitMode, SpreadSample, TradeLog,
};
use chrono::Utc;
use events::{BotEvent, EventBus, OrderUpdate, PositionUpdate, SpreadUpdate, StatusUpdate};
use exchange_port::{ExchangeOrder, ExchangePort, ExchangePosition};
use persistence::DbRepository;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::EngineError;

const TICK_PERIOD: Duration = Duration::from_secs(10);
const SETTLE_DELAY: Duration = Duration::from_secs(2);
const POSITION_REFRESH_EVERY_N_TICKS: u64 = 3;
const BASELINE_RECENCY: chrono::Duration = chrono::Duration::minutes(5);
const MIN_CLOSE_AMOUNT: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

pub struct BotEngine {
    bot_id: BotId,
    exchange: Arc<dyn ExchangePort>,
    db: DbRepository,
    price_cache: exchange_port::price_cache::PriceCache,
    events: Arc<EventBus>,
    is_running: AtomicBool,
    ticks_processed: AtomicU64,
}

impl BotEngine {
    pub fn new(bot_id: BotId, exchange: Arc<dyn ExchangePort>, db: DbRepository, events: Arc<EventBus>) -> Self {
        Self {
            bot_id,
            exchange,
            db,
            price_cache: exchange_port::price_cache::PriceCache::with_default_ttl(),
            events,
            is_running: AtomicBool::new(true),
            ticks_processed: AtomicU64::new(0),
        }
    }

    pub fn bot_id(&self) -> BotId {
        self.bot_id
    }

    pub fn ticks_processed(&self) -> u64 {
        self.ticks_processed.load(Ordering::Relaxed)
    }

    /// Clones the exchange client handle so a sibling task (the Data
    /// Reconciler) can poll the same venue without its own credentials.
    pub fn exchange(&self) -> Arc<dyn ExchangePort> {
        self.exchange.clone()
    }

    /// Flips the flag the tick loop observes before its next iteration. Does
    /// not itself close positions or touch the DB status row — callers
    /// (`BotManager::stop`/`pause`) are responsible for that.
    pub fn request_stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    /// Runs startup, reconciliation, and the tick loop until `request_stop`
    /// is observed or a fatal error occurs.
    pub async fn run(&self) -> Result<(), EngineError> {
        self.startup().await?;

        while self.is_running.load(Ordering::SeqCst) {
            match self.tick().await {
                Ok(()) => {}
                Err(e) if is_fatal(&e) => {
                    tracing::error!(bot_id = %self.bot_id, error = %e, "fatal engine error, stopping");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(bot_id = %self.bot_id, error = %e, "tick error, continuing");
                }
            }
            self.ticks_processed.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(TICK_PERIOD).await;
        }

        Ok(())
    }

    async fn startup(&self) -> Result<(), EngineError> {
        let bot = self.db.get_bot(self.bot_id).await?;
        self.db.update_bot_status(self.bot_id, BotStatus::Running).await?;

        let stagger = 2 + (self.bot_id.as_u128() as u64 % 3);
        tokio::time::sleep(Duration::from_secs(stagger)).await;

        if let Err(e) = self.exchange.set_leverage(&bot.market1_symbol, bot.leverage).await {
            tracing::warn!(bot_id = %self.bot_id, error = %e, symbol = %bot.market1_symbol, "set_leverage failed, continuing");
        }
        if let Err(e) = self.exchange.set_leverage(&bot.market2_symbol, bot.leverage).await {
            tracing::warn!(bot_id = %self.bot_id, error = %e, symbol = %bot.market2_symbol, "set_leverage failed, continuing");
        }

        self.reconcile(&bot).await?;
        Ok(())
    }

    /// Crash recovery: makes persisted state match exchange reality before
    /// any new tick-loop decision is made.
    async fn reconcile(&self, bot: &Bot) -> Result<(), EngineError> {
        let exchange_positions: Vec<_> = self
            .exchange
            .get_all_positions()
            .await?
            .into_iter()
            .filter(|p| p.symbol == bot.market1_symbol || p.symbol == bot.market2_symbol)
            .collect();
        let db_positions = self.db.get_open_positions(self.bot_id).await?;

        let plan = plan_reconciliation(&exchange_positions, &db_positions, bot);

        for exch_pos in &plan.orphans {
            let cycle = self.db.get_max_cycle_number(self.bot_id).await? + 1;
            self.db
                .insert_position(
                    self.bot_id,
                    cycle,
                    &exch_pos.symbol,
                    exch_pos.side,
                    exch_pos.amount,
                    exch_pos.entry_price,
                    Some(exch_pos.current_price),
                    Some(exch_pos.unrealized_pnl),
                )
                .await?;
            tracing::info!(bot_id = %self.bot_id, symbol = %exch_pos.symbol, "reconcile: adopted orphan exchange position");
        }

        for db_pos in &plan.stale {
            self.db.close_position(db_pos.id).await?;
            tracing::info!(bot_id = %self.bot_id, symbol = %db_pos.symbol, "reconcile: closed position missing on exchange");
        }

        if let Some(recomputed) = plan.new_dca_count {
            self.db
                .update_bot_counters(
                    self.bot_id,
                    bot.current_cycle,
                    recomputed,
                    bot.last_trade_spread,
                    bot.first_trade_spread,
                    bot.total_profit,
                    bot.total_trades,
                )
                .await?;
        } else if plan.cycle_reset {
            self.db
                .update_bot_counters(
                    self.bot_id,
                    bot.current_cycle + 1,
                    0,
                    None,
                    None,
                    bot.total_profit,
                    bot.total_trades,
                )
                .await?;
        }

        tracing::info!(bot_id = %self.bot_id, exchange_positions = exchange_positions.len(), "reconciliation complete");
        Ok(())
    }

    async fn tick(&self) -> Result<(), EngineError> {
        let mut bot = self.db.get_bot(self.bot_id).await?;

        let p1 = match self.fetch_price(&bot.market1_symbol).await? {
            Some(p) => p,
            None => return Ok(()),
        };
        let p2 = match self.fetch_price(&bot.market2_symbol).await? {
            Some(p) => p,
            None => return Ok(()),
        };

        let (m1s, m2s) = self.ensure_baselines(&bot, p1, p2).await?;
        if bot.market1_start_price.is_none() {
            bot.market1_start_price = Some(m1s);
            bot.market2_start_price = Some(m2s);
        }

        let s = spread_calculator::spread(p1, m1s, p2, m2s);

        let sample = SpreadSample {
            id: Uuid::new_v4(),
            bot_id: self.bot_id,
            market1_price: p1,
            market2_price: p2,
            spread_percentage: s,
            recorded_at: Utc::now(),
        };
        self.db.record_spread_sample(&sample).await?;
        self.events.publish(BotEvent::SpreadUpdate(SpreadUpdate {
            bot_id: self.bot_id,
            market1_price: p1,
            market2_price: p2,
            spread_percentage: s,
            recorded_at: sample.recorded_at,
        }));

        let mut open_positions = self.db.get_open_positions(self.bot_id).await?;
        if self.ticks_processed() % POSITION_REFRESH_EVERY_N_TICKS == 0 {
            for position in &mut open_positions {
                if let Some(exch_pos) = self.exchange.get_position(&position.symbol).await? {
                    self.db
                        .update_position_prices(position.id, exch_pos.current_price, exch_pos.unrealized_pnl)
                        .await?;
                    position.current_price = Some(exch_pos.current_price);
                    position.unrealized_pnl = Some(exch_pos.unrealized_pnl);
                    self.events.publish(BotEvent::PositionUpdate(PositionUpdate {
                        bot_id: self.bot_id,
                        position: position.clone(),
                    }));
                }
            }
        }

        if !open_positions.is_empty() {
            let total_pnl: Decimal = open_positions.iter().filter_map(|p| p.unrealized_pnl).sum();
            let total_margin = margin_at_risk(&bot);

            let take_profit = match bot.profit_mode {
                ProfitMode::Regression => bot
                    .first_trade_spread
                    .is_some_and(|first| spread_calculator::take_profit_regression(s, first, bot.profit_ratio)),
                ProfitMode::Position => spread_calculator::take_profit_position(total_pnl, total_margin, bot.profit_ratio),
            };
            if take_profit {
                self.close_cycle(&bot).await?;
                return Ok(());
            }

            if bot.stop_loss_ratio > Decimal::ZERO
                && spread_calculator::stop_loss(total_pnl, total_margin, bot.stop_loss_ratio)
            {
                self.close_cycle(&bot).await?;
                return Ok(());
            }
        }

        if bot.current_dca_count < bot.max_dca_times {
            let lvl = bot.current_dca_count as usize;
            if let Some(level) = bot.dca_config.get(lvl).cloned() {
                let triggered = match bot.last_trade_spread {
                    None => s.abs() >= level.threshold_pct,
                    Some(last) => (s - last).abs() >= level.threshold_pct,
                };
                if triggered {
                    self.open_position(&bot, p1, p2, m1s, m2s, s, lvl).await?;
                }
            }
        }

        Ok(())
    }

    /// Step 1 of the tick loop. Returns `None` on a transient failure so the
    /// caller can skip the tick instead of propagating.
    async fn fetch_price(&self, symbol: &str) -> Result<Option<Decimal>, EngineError> {
        match self.price_cache.get(self.exchange.as_ref(), symbol).await {
            Ok(price) => Ok(Some(price)),
            Err(e) if e.is_transient() => {
                tracing::warn!(bot_id = %self.bot_id, symbol, error = %e, "transient price fetch failure, skipping tick");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Step 2: populate `market{1,2}_start_price` on first tick.
    async fn ensure_baselines(&self, bot: &Bot, p1: Decimal, p2: Decimal) -> Result<(Decimal, Decimal), EngineError> {
        if let (Some(m1s), Some(m2s)) = (bot.market1_start_price, bot.market2_start_price) {
            return Ok((m1s, m2s));
        }

        let recent_start = Utc::now() - bot.start_time < BASELINE_RECENCY;
        let (m1s, m2s) = if recent_start {
            (p1, p2)
        } else {
            let ts_ms = bot.start_time.timestamp_millis();
            let h1 = self.exchange.fetch_historical_price(&bot.market1_symbol, ts_ms).await.ok().flatten().unwrap_or(p1);
            let h2 = self.exchange.fetch_historical_price(&bot.market2_symbol, ts_ms).await.ok().flatten().unwrap_or(p2);
            (h1, h2)
        };

        self.db.update_bot_baseline_prices(self.bot_id, m1s, m2s).await?;
        Ok((m1s, m2s))
    }

    /// Open procedure: first entry or scale-in.
    async fn open_position(&self, bot: &Bot, p1: Decimal, p2: Decimal, m1s: Decimal, m2s: Decimal, s: Decimal, lvl: usize) -> Result<(), EngineError> {
        let d1 = spread_calculator::pct_change(p1, m1s);
        let d2 = spread_calculator::pct_change(p2, m2s);
        let (mut side1, mut side2) = spread_calculator::direction(d1, d2);
        if bot.reverse_opening {
            std::mem::swap(&mut side1, &mut side2);
        }
        let side1 = to_order_side(side1);
        let side2 = to_order_side(side2);

        let level = &bot.dca_config[lvl];
        let margin = bot.investment_per_order * level.multiplier;
        let notional = margin * Decimal::from(bot.leverage);
        let amt1 = notional / p1;
        let amt2 = notional / p2;

        let filled1 = self.submit_and_settle(&bot.market1_symbol, side1, amt1, false).await?;
        let filled2 = self.submit_and_settle(&bot.market2_symbol, side2, amt2, false).await?;

        if filled1.filled_amount.is_zero() || filled2.filled_amount.is_zero() {
            self.db
                .log_trade_event(&TradeLog {
                    id: Uuid::new_v4(),
                    bot_id: self.bot_id,
                    log_type: LogLevel::Error,
                    message: "open aborted: at least one leg filled zero".into(),
                    details: None,
                    created_at: Utc::now(),
                })
                .await?;
            return Ok(());
        }

        let dca_level = lvl as u32 + 1;
        let db_order1 = order_from_fill(self.bot_id, bot.current_cycle, dca_level, &bot.market1_symbol, side1, &filled1);
        let db_order2 = order_from_fill(self.bot_id, bot.current_cycle, dca_level, &bot.market2_symbol, side2, &filled2);
        self.db.create_order(&db_order1).await?;
        self.db.create_order(&db_order2).await?;

        let price1 = filled1.cost / filled1.filled_amount;
        let price2 = filled2.cost / filled2.filled_amount;
        let pos1 = self
            .db
            .apply_fill(self.bot_id, bot.current_cycle, &bot.market1_symbol, PositionSide::from_order_side(side1), filled1.filled_amount, price1)
            .await?;
        let pos2 = self
            .db
            .apply_fill(self.bot_id, bot.current_cycle, &bot.market2_symbol, PositionSide::from_order_side(side2), filled2.filled_amount, price2)
            .await?;

        let new_dca_count = bot.current_dca_count + 1;
        let first_trade_spread = bot.first_trade_spread.or(Some(s));
        self.db
            .update_bot_counters(self.bot_id, bot.current_cycle, new_dca_count, Some(s), first_trade_spread, bot.total_profit, bot.total_trades + 2)
            .await?;

        self.events.publish(BotEvent::OrderUpdate(OrderUpdate { bot_id: self.bot_id, order: db_order1 }));
        self.events.publish(BotEvent::OrderUpdate(OrderUpdate { bot_id: self.bot_id, order: db_order2 }));
        self.events.publish(BotEvent::PositionUpdate(PositionUpdate { bot_id: self.bot_id, position: pos1 }));
        self.events.publish(BotEvent::PositionUpdate(PositionUpdate { bot_id: self.bot_id, position: pos2 }));

        Ok(())
    }

    /// Close procedure: take-profit, stop-loss, or an externally requested
    /// close of every open leg.
    pub async fn close_cycle(&self, bot: &Bot) -> Result<(), EngineError> {
        let open_positions = self.db.get_open_positions(self.bot_id).await?;
        let mut cycle_realized_pnl = Decimal::ZERO;

        for position in &open_positions {
            let close_side = position.side.closing_side();
            let exchange_position = self.exchange.get_position(&position.symbol).await?;
            let actual_amount = exchange_position.map(|p| p.amount).unwrap_or(Decimal::ZERO);

            cycle_realized_pnl += position.unrealized_pnl.unwrap_or(Decimal::ZERO);

            if actual_amount < MIN_CLOSE_AMOUNT {
                self.db.close_position(position.id).await?;
                continue;
            }

            let filled = self.submit_and_settle(&position.symbol, close_side, actual_amount, true).await?;
            let close_order = order_from_fill(self.bot_id, bot.current_cycle, 0, &position.symbol, close_side, &filled);
            self.db.create_order(&close_order).await?;
            self.events.publish(BotEvent::OrderUpdate(OrderUpdate { bot_id: self.bot_id, order: close_order }));
            self.db.close_position(position.id).await?;
        }

        let new_total_profit = bot.total_profit + cycle_realized_pnl;
        self.db
            .update_bot_counters(self.bot_id, bot.current_cycle + 1, 0, None, None, new_total_profit, bot.total_trades)
            .await?;

        let mut status = bot.status;
        if bot.pause_after_close {
            self.db.update_bot_status(self.bot_id, BotStatus::Paused).await?;
            status = BotStatus::Paused;
            self.is_running.store(false, Ordering::SeqCst);
        }
        self.events.publish(BotEvent::StatusUpdate(StatusUpdate {
            bot_id: self.bot_id,
            status,
            message: Some(format!("cycle {} closed, realized pnl {}", bot.current_cycle, cycle_realized_pnl)),
        }));

        Ok(())
    }

    async fn submit_and_settle(&self, symbol: &str, side: OrderSide, amount: Decimal, reduce_only: bool) -> Result<ExchangeOrder, EngineError> {
        let order = self.exchange.create_market_order(symbol, side, amount, reduce_only).await?;
        tokio::time::sleep(SETTLE_DELAY).await;
        let refreshed = self.exchange.get_order(&order.exchange_order_id, symbol).await?;
        Ok(refreshed)
    }

    pub async fn close_exchange(&self) {
        self.exchange.close().await;
    }
}

fn is_fatal(err: &EngineError) -> bool {
    matches!(
        err,
        EngineError::Exchange(exchange_port::ExchangeError::Auth(_))
            | EngineError::Exchange(exchange_port::ExchangeError::SymbolUnknown(_))
            | EngineError::Database(_)
    )
}

/// `Σ_{i=0..current_dca_count-1} per_order_margin · dca_config[i].multiplier`
fn margin_at_risk(bot: &Bot) -> Decimal {
    bot.dca_config
        .iter()
        .take(bot.current_dca_count as usize)
        .map(|level| bot.investment_per_order * level.multiplier)
        .sum()
}

fn to_order_side(side: spread_calculator::Side) -> OrderSide {
    match side {
        spread_calculator::Side::Buy => OrderSide::Buy,
        spread_calculator::Side::Sell => OrderSide::Sell,
    }
}

/// Diff between what the exchange reports open and what the database has
/// open for a bot, plus the DCA counter recompute that follows from it.
struct ReconcilePlan<'a> {
    orphans: Vec<&'a ExchangePosition>,
    stale: Vec<&'a Position>,
    new_dca_count: Option<u32>,
    cycle_reset: bool,
}

fn plan_reconciliation<'a>(exchange_positions: &'a [ExchangePosition], db_positions: &'a [Position], bot: &Bot) -> ReconcilePlan<'a> {
    let orphans: Vec<_> = exchange_positions
        .iter()
        .filter(|p| !db_positions.iter().any(|d| d.symbol == p.symbol))
        .collect();
    let stale: Vec<_> = db_positions
        .iter()
        .filter(|d| !exchange_positions.iter().any(|p| p.symbol == d.symbol))
        .collect();

    let n = exchange_positions.len() as u32;
    let (new_dca_count, cycle_reset) = if n > 0 {
        let recomputed = n / 2;
        let changed = if recomputed != bot.current_dca_count { Some(recomputed) } else { None };
        (changed, false)
    } else {
        let needs_reset = bot.current_dca_count != 0
            || bot.last_trade_spread.is_some()
            || bot.first_trade_spread.is_some()
            || !stale.is_empty();
        (None, needs_reset)
    };

    ReconcilePlan { orphans, stale, new_dca_count, cycle_reset }
}

fn order_from_fill(bot_id: BotId, cycle_number: u32, dca_level: u32, symbol: &str, side: OrderSide, filled: &ExchangeOrder) -> Order {
    let now = Utc::now();
    Order {
        id: Uuid::new_v4(),
        bot_id,
        cycle_number,
        dca_level,
        exchange_order_id: Some(filled.exchange_order_id.clone()),
        symbol: symbol.to_string(),
        side,
        order_type: OrderType::Market,
        price: filled.price,
        amount: filled.requested_amount,
        filled_amount: filled.filled_amount,
        cost: Some(filled.cost),
        status: OrderStatus::Closed,
        created_at: now,
        updated_at: now,
        filled_at: Some(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_bot(current_dca_count: u32) -> Bot {
        let now = Utc::now();
        Bot {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            exchange_account_id: Uuid::new_v4(),
            bot_name: "test".into(),
            market1_symbol: "BTCUSDT".into(),
            market2_symbol: "ETHUSDT".into(),
            start_time: now,
            leverage: 5,
            order_type_open: OrderType::Market,
            order_type_close: OrderType::Market,
            investment_per_order: dec!(100),
            max_position_value: dec!(1000),
            max_dca_times: 5,
            dca_config: vec![],
            profit_mode: ProfitMode::Regression,
            profit_ratio: dec!(0.01),
            stop_loss_ratio: dec!(0.02),
            reverse_opening: false,
            pause_after_close: false,
            market1_start_price: Some(dec!(100)),
            market2_start_price: Some(dec!(100)),
            status: BotStatus::Running,
            current_cycle: 1,
            current_dca_count,
            last_trade_spread: None,
            first_trade_spread: None,
            total_profit: dec!(0),
            total_trades: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn exch_pos(symbol: &str) -> ExchangePosition {
        ExchangePosition {
            symbol: symbol.to_string(),
            side: PositionSide::Long,
            amount: dec!(1),
            entry_price: dec!(100),
            current_price: dec!(100),
            unrealized_pnl: dec!(0),
        }
    }

    fn db_pos(symbol: &str) -> Position {
        let now = Utc::now();
        Position {
            id: Uuid::new_v4(),
            bot_id: Uuid::new_v4(),
            cycle_number: 1,
            symbol: symbol.to_string(),
            side: PositionSide::Long,
            amount: dec!(1),
            entry_price: dec!(100),
            current_price: None,
            unrealized_pnl: None,
            is_open: true,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    #[test]
    fn adopts_orphan_exchange_position_missing_from_db() {
        let bot = test_bot(0);
        let exchange_positions = vec![exch_pos("BTCUSDT")];
        let db_positions = vec![];

        let plan = plan_reconciliation(&exchange_positions, &db_positions, &bot);

        assert_eq!(plan.orphans.len(), 1);
        assert_eq!(plan.orphans[0].symbol, "BTCUSDT");
        assert!(plan.stale.is_empty());
    }

    #[test]
    fn closes_stale_db_position_missing_from_exchange() {
        let bot = test_bot(1);
        let exchange_positions = vec![];
        let db_positions = vec![db_pos("BTCUSDT")];

        let plan = plan_reconciliation(&exchange_positions, &db_positions, &bot);

        assert!(plan.orphans.is_empty());
        assert_eq!(plan.stale.len(), 1);
        assert_eq!(plan.stale[0].symbol, "BTCUSDT");
        assert!(plan.cycle_reset);
    }

    #[test]
    fn matched_positions_are_neither_orphan_nor_stale() {
        let bot = test_bot(1);
        let exchange_positions = vec![exch_pos("BTCUSDT"), exch_pos("ETHUSDT")];
        let db_positions = vec![db_pos("BTCUSDT"), db_pos("ETHUSDT")];

        let plan = plan_reconciliation(&exchange_positions, &db_positions, &bot);

        assert!(plan.orphans.is_empty());
        assert!(plan.stale.is_empty());
        assert!(plan.new_dca_count.is_none());
        assert!(!plan.cycle_reset);
    }

    #[test]
    fn recomputes_dca_count_from_open_position_pairs() {
        let bot = test_bot(0);
        let exchange_positions = vec![exch_pos("BTCUSDT"), exch_pos("ETHUSDT")];
        let db_positions = vec![db_pos("BTCUSDT"), db_pos("ETHUSDT")];

        let plan = plan_reconciliation(&exchange_positions, &db_positions, &bot);

        assert_eq!(plan.new_dca_count, Some(1));
    }

    #[test]
    fn no_exchange_positions_resets_cycle_when_counters_are_dirty() {
        let bot = test_bot(2);
        let plan = plan_reconciliation(&[], &[], &bot);
        assert!(plan.cycle_reset);
        assert!(plan.new_dca_count.is_none());
    }

    #[test]
    fn no_exchange_positions_and_clean_counters_need_no_reset() {
        let bot = test_bot(0);
        let plan = plan_reconciliation(&[], &[], &bot);
        assert!(!plan.cycle_reset);
    }
}
