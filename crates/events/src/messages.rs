use bot_types::{BotId, BotStatus, Order, Position};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single spread sample the engine just recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadUpdate {
    pub bot_id: BotId,
    pub market1_price: Decimal,
    pub market2_price: Decimal,
    pub spread_percentage: Decimal,
    pub recorded_at: DateTime<Utc>,
}

/// An order was placed, filled, or canceled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub bot_id: BotId,
    pub order: Order,
}

/// A position was opened, scaled, or closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub bot_id: BotId,
    pub position: Position,
}

/// The bot's lifecycle status changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub bot_id: BotId,
    pub status: BotStatus,
    pub message: Option<String>,
}

/// The four message kinds a running bot broadcasts. Serialized
/// with `#[serde(tag = "type", content = "payload")]` so a JSON frame looks
/// like `{"type": "SpreadUpdate", "payload": {...}}` — the shape the
/// control-plane's WebSocket clients expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BotEvent {
    SpreadUpdate(SpreadUpdate),
    OrderUpdate(OrderUpdate),
    PositionUpdate(PositionUpdate),
    StatusUpdate(StatusUpdate),
}

impl BotEvent {
    pub fn bot_id(&self) -> BotId {
        match self {
            BotEvent::SpreadUpdate(e) => e.bot_id,
            BotEvent::OrderUpdate(e) => e.bot_id,
            BotEvent::PositionUpdate(e) => e.bot_id,
            BotEvent::StatusUpdate(e) => e.bot_id,
        }
    }
}
