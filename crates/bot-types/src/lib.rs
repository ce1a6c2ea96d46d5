pub mod entities;
pub mod enums;
pub mod error;

pub use entities::{Bot, DcaLevel, ExchangeAccount, Order, Position, SpreadSample, TradeLog};
pub use enums::{BotStatus, ExchangeName, LogLevel, OrderSide, OrderStatus, OrderType, PositionSide, ProfitMode};
pub use error::CoreError;
