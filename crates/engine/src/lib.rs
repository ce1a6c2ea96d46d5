//! The bot execution engine and its lifecycle controller: the concurrent
//! scheduler that per-bot polls prices,
//! computes spreads, makes open/scale-in/close decisions, issues exchange
//! orders with retries, reconciles with exchange-reported state on startup,
//! and fans realtime updates to subscribers.

pub mod bot_engine;
pub mod error;
pub mod manager;
pub mod reconciler;

pub use bot_engine::BotEngine;
pub use error::EngineError;
pub use manager::BotManager;
pub use reconciler::DataReconciler;
