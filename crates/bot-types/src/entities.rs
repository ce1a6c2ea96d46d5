use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{BotStatus, ExchangeName, OrderSide, OrderStatus, OrderType, PositionSide, ProfitMode};

pub type BotId = Uuid;

/// One entry of `Bot.dca_config`: the `index`-th scale-in fires once the spread
/// moves `threshold_pct` past the previous trigger, sized at `multiplier` times
/// `investment_per_order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaLevel {
    pub index: u32,
    pub threshold_pct: Decimal,
    pub multiplier: Decimal,
}

/// Credentials for a user's exchange account. Values here are opaque strings —
/// decryption happens in the control-plane collaborator, never in this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub exchange_name: ExchangeName,
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: Option<String>,
    pub is_testnet: bool,
    pub proxy_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: BotId,
    pub user_id: Uuid,
    pub exchange_account_id: Uuid,
    pub bot_name: String,

    // market configuration (immutable while running)
    pub market1_symbol: String,
    pub market2_symbol: String,
    pub start_time: DateTime<Utc>,
    pub leverage: u32,
    pub order_type_open: OrderType,
    pub order_type_close: OrderType,
    pub investment_per_order: Decimal,
    pub max_position_value: Decimal,
    pub max_dca_times: u32,
    pub dca_config: Vec<DcaLevel>,
    pub profit_mode: ProfitMode,
    pub profit_ratio: Decimal,
    pub stop_loss_ratio: Decimal,
    pub reverse_opening: bool,
    pub pause_after_close: bool,

    // baseline prices, nullable until first tick
    pub market1_start_price: Option<Decimal>,
    pub market2_start_price: Option<Decimal>,

    // live counters
    pub status: BotStatus,
    pub current_cycle: u32,
    pub current_dca_count: u32,
    pub last_trade_spread: Option<Decimal>,
    pub first_trade_spread: Option<Decimal>,
    pub total_profit: Decimal,
    pub total_trades: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bot {
    /// `dca_config[current_dca_count].index == current_dca_count + 1` — the next
    /// scale-in level the engine would use if it opened right now.
    pub fn next_dca_level(&self) -> Option<&DcaLevel> {
        self.dca_config.get(self.current_dca_count as usize)
    }

    /// Whether the invariant `current_dca_count == 0 iff no spread history` holds.
    pub fn is_flat(&self) -> bool {
        self.current_dca_count == 0
            && self.last_trade_spread.is_none()
            && self.first_trade_spread.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub bot_id: BotId,
    pub cycle_number: u32,
    pub dca_level: u32,
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub filled_amount: Decimal,
    pub cost: Option<Decimal>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub bot_id: BotId,
    pub cycle_number: u32,
    pub symbol: String,
    pub side: PositionSide,
    pub amount: Decimal,
    pub entry_price: Decimal,
    pub current_price: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub is_open: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    /// VWAP merge of an additional fill on the same side.
    pub fn merge_same_side(&mut self, fill_amount: Decimal, fill_price: Decimal) {
        let total = self.amount + fill_amount;
        if total.is_zero() {
            return;
        }
        self.entry_price = (self.amount * self.entry_price + fill_amount * fill_price) / total;
        self.amount = total;
    }

    /// Reduces the position by an opposite-side fill, closing it once the
    /// remainder reaches zero or below. Returns true if the position closed.
    pub fn reduce_opposite_side(&mut self, fill_amount: Decimal, closed_at: DateTime<Utc>) -> bool {
        let remaining = self.amount - fill_amount;
        if remaining <= Decimal::ZERO {
            self.amount = Decimal::ZERO;
            self.is_open = false;
            self.closed_at = Some(closed_at);
            true
        } else {
            self.amount = remaining;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(side: PositionSide, amount: Decimal, entry_price: Decimal) -> Position {
        let now = Utc::now();
        Position {
            id: Uuid::new_v4(),
            bot_id: Uuid::new_v4(),
            cycle_number: 1,
            symbol: "BTCUSDT".into(),
            side,
            amount,
            entry_price,
            current_price: None,
            unrealized_pnl: None,
            is_open: true,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    #[test]
    fn merge_same_side_weights_by_amount() {
        let mut pos = position(PositionSide::Long, dec!(1), dec!(100));
        pos.merge_same_side(dec!(3), dec!(200));
        assert_eq!(pos.amount, dec!(4));
        assert_eq!(pos.entry_price, dec!(175));
    }

    #[test]
    fn merge_same_side_on_empty_position_is_a_no_op() {
        let mut pos = position(PositionSide::Long, dec!(0), dec!(0));
        pos.merge_same_side(dec!(0), dec!(50));
        assert_eq!(pos.amount, dec!(0));
        assert_eq!(pos.entry_price, dec!(0));
    }

    #[test]
    fn reduce_opposite_side_partial_fill_keeps_position_open() {
        let mut pos = position(PositionSide::Long, dec!(5), dec!(100));
        let closed = pos.reduce_opposite_side(dec!(2), Utc::now());
        assert!(!closed);
        assert!(pos.is_open);
        assert_eq!(pos.amount, dec!(3));
        assert_eq!(pos.entry_price, dec!(100));
    }

    #[test]
    fn reduce_opposite_side_full_fill_closes_position() {
        let mut pos = position(PositionSide::Long, dec!(5), dec!(100));
        let closed_at = Utc::now();
        let closed = pos.reduce_opposite_side(dec!(5), closed_at);
        assert!(closed);
        assert!(!pos.is_open);
        assert_eq!(pos.amount, dec!(0));
        assert_eq!(pos.closed_at, Some(closed_at));
    }

    #[test]
    fn reduce_opposite_side_overfill_closes_without_going_negative() {
        let mut pos = position(PositionSide::Long, dec!(5), dec!(100));
        let closed = pos.reduce_opposite_side(dec!(8), Utc::now());
        assert!(closed);
        assert_eq!(pos.amount, dec!(0));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadSample {
    pub id: Uuid,
    pub bot_id: BotId,
    pub market1_price: Decimal,
    pub market2_price: Decimal,
    pub spread_percentage: Decimal,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeLog {
    pub id: Uuid,
    pub bot_id: BotId,
    pub log_type: crate::enums::LogLevel,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
