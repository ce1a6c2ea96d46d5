//! # Events
//!
//! Real-time event structures and the per-bot fan-out bus used for
//! WebSocket communication between the engine and the control plane.
//!
//! As a low-level crate, this depends only on `bot-types` and provides the
//! definitive language for real-time state synchronization.

pub mod error;
pub mod event_bus;
pub mod messages;

pub use error::EventsError;
pub use event_bus::EventBus;
pub use messages::{BotEvent, OrderUpdate, PositionUpdate, SpreadUpdate, StatusUpdate};
