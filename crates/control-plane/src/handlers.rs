use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    Json,
};
use bot_types::{Bot, BotId, DcaLevel, OrderType, ProfitMode};
use chrono::Utc;
use events::BotEvent;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{error::AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateBotRequest {
    pub user_id: Uuid,
    pub exchange_account_id: Uuid,
    pub bot_name: String,
    pub market1_symbol: String,
    pub market2_symbol: String,
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
    #[serde(default)]
    pub reverse_opening: bool,
    #[serde(default)]
    pub pause_after_close: bool,
}

/// Validates and inserts a new bot. Rejects four invariant violations before
/// touching the database.
pub async fn create_bot(State(state): State<Arc<AppState>>, Json(req): Json<CreateBotRequest>) -> Result<Json<Bot>, AppError> {
    if req.market1_symbol == req.market2_symbol {
        return Err(AppError::validation("market1_symbol and market2_symbol must differ"));
    }
    if req.dca_config.len() as u32 > req.max_dca_times {
        return Err(AppError::validation("dca_config has more entries than max_dca_times"));
    }
    for (i, level) in req.dca_config.iter().enumerate() {
        if level.index != i as u32 + 1 {
            return Err(AppError::validation(format!("dca_config[{i}].index must be {}", i + 1)));
        }
    }
    let max_position = req
        .dca_config
        .iter()
        .take(req.max_dca_times as usize)
        .fold(Decimal::ZERO, |acc, level| acc + req.investment_per_order * level.multiplier);
    if max_position > req.max_position_value {
        return Err(AppError::validation("sum of per-order margin across dca levels exceeds max_position_value"));
    }

    let now = Utc::now();
    let bot = Bot {
        id: Uuid::new_v4(),
        user_id: req.user_id,
        exchange_account_id: req.exchange_account_id,
        bot_name: req.bot_name,
        market1_symbol: req.market1_symbol,
        market2_symbol: req.market2_symbol,
        start_time: now,
        leverage: req.leverage,
        order_type_open: req.order_type_open,
        order_type_close: req.order_type_close,
        investment_per_order: req.investment_per_order,
        max_position_value: req.max_position_value,
        max_dca_times: req.max_dca_times,
        dca_config: req.dca_config,
        profit_mode: req.profit_mode,
        profit_ratio: req.profit_ratio,
        stop_loss_ratio: req.stop_loss_ratio,
        reverse_opening: req.reverse_opening,
        pause_after_close: req.pause_after_close,
        market1_start_price: None,
        market2_start_price: None,
        status: bot_types::BotStatus::Stopped,
        current_cycle: 0,
        current_dca_count: 0,
        last_trade_spread: None,
        first_trade_spread: None,
        total_profit: Decimal::ZERO,
        total_trades: 0,
        created_at: now,
        updated_at: now,
    };

    state.db.create_bot(&bot).await?;
    Ok(Json(bot))
}

pub async fn list_bots(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Bot>>, AppError> {
    Ok(Json(state.db.list_bots().await?))
}

pub async fn get_bot(Path(bot_id): Path<BotId>, State(state): State<Arc<AppState>>) -> Result<Json<Bot>, AppError> {
    Ok(Json(state.db.get_bot(bot_id).await?))
}

pub async fn start_bot(Path(bot_id): Path<BotId>, State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    state.manager.start(bot_id).await?;
    Ok(Json(json!({ "status": "started" })))
}

pub async fn stop_bot(Path(bot_id): Path<BotId>, State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    state.manager.stop(bot_id).await?;
    Ok(Json(json!({ "status": "stopped" })))
}

pub async fn pause_bot(Path(bot_id): Path<BotId>, State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    state.manager.pause(bot_id).await?;
    Ok(Json(json!({ "status": "paused" })))
}

pub async fn close_positions(Path(bot_id): Path<BotId>, State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    state.manager.close_positions(bot_id).await?;
    Ok(Json(json!({ "status": "closed" })))
}

/// Upgrades to the per-bot event stream: sends a
/// `connection_established` handshake, then relays every `BotEvent` the
/// engine publishes for this bot, translated into the wire envelope
/// `{type, timestamp, data}`. Replies to client `{"type":"ping"}` frames
/// with `{"type":"pong","timestamp":...}`.
pub async fn websocket_handler(Path(bot_id): Path<BotId>, State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, bot_id))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, bot_id: BotId) {
    let bot = match state.db.get_bot(bot_id).await {
        Ok(bot) => bot,
        Err(e) => {
            tracing::warn!(%bot_id, error = %e, "websocket client requested unknown bot");
            let _ = socket.send(Message::Text(json!({"code": "bot_not_found", "message": e.to_string()}).to_string())).await;
            return;
        }
    };

    let handshake = json!({
        "type": "connection_established",
        "data": { "bot_id": bot.id, "bot_name": bot.bot_name, "status": bot.status },
    });
    if socket.send(Message::Text(handshake.to_string())).await.is_err() {
        return;
    }

    let mut rx = state.events.subscribe(bot_id);
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Ok(event) = event else { break };
                let frame = bot_event_to_frame(&event);
                if socket.send(Message::Text(frame.to_string())).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
                            if value.get("type").and_then(|t| t.as_str()) == Some("ping") {
                                let pong = json!({ "type": "pong", "timestamp": Utc::now() });
                                if socket.send(Message::Text(pong.to_string())).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::warn!(%bot_id, error = %e, "websocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
    tracing::debug!(%bot_id, "websocket client disconnected");
}

fn bot_event_to_frame(event: &BotEvent) -> serde_json::Value {
    let now = Utc::now();
    match event {
        BotEvent::SpreadUpdate(e) => json!({ "type": "spread_update", "timestamp": now, "data": e }),
        BotEvent::OrderUpdate(e) => json!({ "type": "order_update", "timestamp": now, "data": e }),
        BotEvent::PositionUpdate(e) => json!({ "type": "position_update", "timestamp": now, "data": e }),
        BotEvent::StatusUpdate(e) => json!({ "type": "status_update", "timestamp": now, "data": e }),
    }
}
