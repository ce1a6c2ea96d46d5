//! Data Reconciler: a secondary loop, one per running bot, that polls the
//! exchange every 30 s and repairs stale order and position rows the tick
//! loop missed.

use std::sync::Arc;
use std::time::Duration;

use bot_types::{BotId, OrderStatus};
use chrono::Utc;
use exchange_port::ExchangePort;
use persistence::DbRepository;
use tokio::time::interval;

use crate::error::EngineError;

const RECONCILE_PERIOD: Duration = Duration::from_secs(30);

pub struct DataReconciler {
    bot_id: BotId,
    exchange: Arc<dyn ExchangePort>,
    db: DbRepository,
}

impl DataReconciler {
    pub fn new(bot_id: BotId, exchange: Arc<dyn ExchangePort>, db: DbRepository) -> Self {
        Self { bot_id, exchange, db }
    }

    pub async fn run_reconciliation(&self) -> Result<(), EngineError> {
        self.poll_open_orders().await?;
        self.diff_positions().await?;
        Ok(())
    }

    async fn poll_open_orders(&self) -> Result<(), EngineError> {
        let orders = self.db.get_open_orders(self.bot_id).await?;
        for order in orders {
            let Some(exchange_order_id) = &order.exchange_order_id else { continue };
            let refreshed = self.exchange.get_order(exchange_order_id, &order.symbol).await?;
            if refreshed.status != order.status {
                let filled_at = (refreshed.status == OrderStatus::Closed).then(Utc::now);
                self.db
                    .update_order_fill(order.id, refreshed.filled_amount, Some(refreshed.cost), refreshed.status, filled_at)
                    .await?;
            }
        }
        Ok(())
    }

    async fn diff_positions(&self) -> Result<(), EngineError> {
        let bot = self.db.get_bot(self.bot_id).await?;
        let exchange_positions: Vec<_> = self
            .exchange
            .get_all_positions()
            .await?
            .into_iter()
            .filter(|p| p.symbol == bot.market1_symbol || p.symbol == bot.market2_symbol)
            .collect();
        let db_positions = self.db.get_open_positions(self.bot_id).await?;

        for db_pos in &db_positions {
            match exchange_positions.iter().find(|p| p.symbol == db_pos.symbol) {
                Some(exch_pos) if exch_pos.amount != db_pos.amount => {
                    self.db.update_position_amount(db_pos.id, exch_pos.amount).await?;
                }
                Some(_) => {}
                None => {
                    self.db.close_position(db_pos.id).await?;
                }
            }
        }

        for exch_pos in &exchange_positions {
            if !db_positions.iter().any(|p| p.symbol == exch_pos.symbol) {
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
            }
        }

        Ok(())
    }

    pub async fn start(self) {
        tracing::info!(bot_id = %self.bot_id, "starting data reconciler");
        let mut timer = interval(RECONCILE_PERIOD);
        loop {
            timer.tick().await;
            if let Err(e) = self.run_reconciliation().await {
                tracing::error!(bot_id = %self.bot_id, error = %e, "data reconciler error");
            }
        }
    }
}
