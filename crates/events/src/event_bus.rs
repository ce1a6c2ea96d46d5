//! Per-bot fan-out over `tokio::sync::broadcast`. A single instance is held
//! by the Manager, not a free global; the bus is keyed by `BotId` so each
//! bot's control-plane subscribers only see that bot's events.

use std::collections::HashMap;
use std::sync::Mutex;

use bot_types::BotId;
use tokio::sync::broadcast;

use crate::messages::BotEvent;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
pub struct EventBus {
    senders: Mutex<HashMap<BotId, broadcast::Sender<BotEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to `bot_id`'s topic, creating it if this is the first
    /// subscriber (e.g. a WebSocket client connecting before the bot's first
    /// tick).
    pub fn subscribe(&self, bot_id: BotId) -> broadcast::Receiver<BotEvent> {
        let mut senders = self.senders.lock().expect("event bus lock poisoned");
        senders.entry(bot_id).or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0).subscribe()
    }

    /// Publishes an event to its bot's topic. A no-op if nobody is
    /// subscribed — `broadcast::Sender::send` only fails when there are zero
    /// receivers, which is an expected steady state, not an error.
    pub fn publish(&self, event: BotEvent) {
        let bot_id = event.bot_id();
        let mut senders = self.senders.lock().expect("event bus lock poisoned");
        let sender = senders.entry(bot_id).or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        let _ = sender.send(event);
    }

    /// Drops a bot's topic once it's stopped and recovered, so subscriber
    /// counts don't leak across a bot's lifetime.
    pub fn remove(&self, bot_id: BotId) {
        self.senders.lock().expect("event bus lock poisoned").remove(&bot_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bot_types::BotStatus;
    use crate::messages::StatusUpdate;
    use uuid::Uuid;

    #[tokio::test]
    async fn publish_reaches_subscribed_bot_only() {
        let bus = EventBus::new();
        let bot_a = Uuid::new_v4();
        let bot_b = Uuid::new_v4();

        let mut rx_a = bus.subscribe(bot_a);
        let mut rx_b = bus.subscribe(bot_b);

        bus.publish(BotEvent::StatusUpdate(StatusUpdate { bot_id: bot_a, status: BotStatus::Running, message: None }));

        let received = rx_a.recv().await.unwrap();
        assert_eq!(received.bot_id(), bot_a);
        assert!(rx_b.try_recv().is_err());
    }
}
