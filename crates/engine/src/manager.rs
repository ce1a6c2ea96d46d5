//! Process-wide registry and lifecycle controller for Bot Engines. Tracks
//! every running bot by id and owns starting, stopping, pausing, closing,
//! and crash recovery.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bot_types::{BotId, BotStatus};
use events::EventBus;
use exchange_port::{ExchangeCredentials, ExchangeFactory};
use persistence::DbRepository;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::bot_engine::BotEngine;
use crate::error::EngineError;
use crate::reconciler::DataReconciler;

const STOP_GRACE: Duration = Duration::from_secs(15);

pub struct BotManager {
    db: DbRepository,
    factory: ExchangeFactory,
    events: Arc<EventBus>,
    running: Mutex<HashMap<BotId, Arc<BotEngine>>>,
    tasks: Mutex<HashMap<BotId, JoinHandle<()>>>,
    reconciler_tasks: Mutex<HashMap<BotId, JoinHandle<()>>>,
}

impl BotManager {
    pub fn new(db: DbRepository, factory: ExchangeFactory, events: Arc<EventBus>) -> Self {
        Self {
            db,
            factory,
            events,
            running: Mutex::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            reconciler_tasks: Mutex::new(HashMap::new()),
        }
    }

    async fn build_engine(&self, bot_id: BotId) -> Result<Arc<BotEngine>, EngineError> {
        let bot = self.db.get_bot(bot_id).await?;
        let account = self.db.get_exchange_account(bot.exchange_account_id).await?;

        let mut credentials = ExchangeCredentials::new(account.exchange_name, account.api_key.clone(), account.api_secret.clone(), account.is_testnet);
        if let Some(passphrase) = account.passphrase.clone() {
            credentials = credentials.with_passphrase(passphrase);
        }
        if let Some(proxy_url) = account.proxy_url.clone() {
            credentials = credentials.with_proxy(proxy_url);
        }

        let exchange = self
            .factory
            .create(account.exchange_name.as_str(), credentials)
            .map_err(|_| EngineError::UnknownExchange(account.exchange_name.as_str().to_string()))?;

        Ok(Arc::new(BotEngine::new(bot_id, exchange, self.db.clone(), self.events.clone())))
    }

    /// Launches a bot's tick loop as an independent task. Refuses if the bot
    /// is already tracked in the registry.
    pub async fn start(self: &Arc<Self>, bot_id: BotId) -> Result<(), EngineError> {
        {
            let running = self.running.lock().await;
            if running.contains_key(&bot_id) {
                return Err(EngineError::AlreadyRunning(bot_id));
            }
        }

        let engine = self.build_engine(bot_id).await?;
        self.running.lock().await.insert(bot_id, engine.clone());

        let manager = Arc::clone(self);
        let task_engine = engine.clone();
        let handle = tokio::spawn(async move {
            let result = task_engine.run().await;
            task_engine.close_exchange().await;

            if let Err(e) = result {
                tracing::error!(bot_id = %bot_id, error = %e, "engine terminated abnormally");
                let _ = manager.db.update_bot_status(bot_id, BotStatus::Stopped).await;
            }
            manager.running.lock().await.remove(&bot_id);
            manager.tasks.lock().await.remove(&bot_id);
            if let Some(reconciler_handle) = manager.reconciler_tasks.lock().await.remove(&bot_id) {
                reconciler_handle.abort();
            }
        });

        self.tasks.lock().await.insert(bot_id, handle);

        // Data Reconciler: a sibling task sharing the engine's exchange client
        // and DB session but nothing mutable between them.
        let reconciler = DataReconciler::new(bot_id, engine.exchange(), self.db.clone());
        let reconciler_handle = tokio::spawn(reconciler.start());
        self.reconciler_tasks.lock().await.insert(bot_id, reconciler_handle);

        Ok(())
    }

    /// Orderly stop: close every open leg with a bounded grace period, flip
    /// the running flag, and await the task before dropping the exchange
    /// client.
    pub async fn stop(self: &Arc<Self>, bot_id: BotId) -> Result<(), EngineError> {
        let engine = {
            let running = self.running.lock().await;
            running.get(&bot_id).cloned()
        };
        let Some(engine) = engine else {
            return Ok(());
        };

        let bot = self.db.get_bot(bot_id).await?;
        if tokio::time::timeout(STOP_GRACE, engine.close_cycle(&bot)).await.is_err() {
            tracing::warn!(bot_id = %bot_id, "close-all grace period elapsed before positions finished closing");
        }

        engine.request_stop();
        self.db.update_bot_status(bot_id, BotStatus::Stopped).await?;

        let handle = self.tasks.lock().await.remove(&bot_id);
        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_GRACE, handle).await.is_err() {
                tracing::warn!(bot_id = %bot_id, "hard-cancelling engine task after stop timeout");
            }
        }
        self.running.lock().await.remove(&bot_id);
        Ok(())
    }

    /// Pauses without closing positions: the tick loop exits on its own
    /// accord once it observes the flag, and the completion hook in `start`
    /// leaves `status` alone because `run()` returns `Ok(())`.
    pub async fn pause(self: &Arc<Self>, bot_id: BotId) -> Result<(), EngineError> {
        let engine = {
            let running = self.running.lock().await;
            running.get(&bot_id).cloned()
        };
        let Some(engine) = engine else {
            return Err(EngineError::BotNotFound(bot_id));
        };
        engine.request_stop();
        self.db.update_bot_status(bot_id, BotStatus::Paused).await?;
        Ok(())
    }

    /// Closes every open leg for a bot. If the bot is running, delegates to
    /// its engine; otherwise builds a transient exchange client just for this
    /// operation.
    pub async fn close_positions(self: &Arc<Self>, bot_id: BotId) -> Result<(), EngineError> {
        let engine = {
            let running = self.running.lock().await;
            running.get(&bot_id).cloned()
        };

        let bot = self.db.get_bot(bot_id).await?;
        match engine {
            Some(engine) => engine.close_cycle(&bot).await,
            None => {
                let transient = self.build_engine(bot_id).await?;
                let result = transient.close_cycle(&bot).await;
                transient.close_exchange().await;
                result
            }
        }
    }

    /// On process boot, restarts every bot persisted as `running`. Bots that
    /// fail to start are forced back to `stopped` rather than left dangling.
    pub async fn recover_all(self: &Arc<Self>) -> Result<(), EngineError> {
        let bots = self.db.get_recoverable_bots().await?;
        for bot in bots {
            if bot.status != BotStatus::Running {
                continue;
            }
            if let Err(e) = self.start(bot.id).await {
                tracing::error!(bot_id = %bot.id, error = %e, "failed to recover bot, forcing stopped");
                let _ = self.db.update_bot_status(bot.id, BotStatus::Stopped).await;
            }
        }
        Ok(())
    }

    pub async fn cleanup(self: &Arc<Self>) {
        let ids: Vec<BotId> = self.running.lock().await.keys().copied().collect();
        for bot_id in ids {
            if let Err(e) = self.stop(bot_id).await {
                tracing::error!(bot_id = %bot_id, error = %e, "error stopping bot during cleanup");
            }
        }
    }
}
