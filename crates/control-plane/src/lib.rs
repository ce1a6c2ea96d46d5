use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing::{get, post}, Router};
use engine::BotManager;
use events::EventBus;
use persistence::DbRepository;
use tower_http::cors::{Any, CorsLayer};

pub mod error;
pub mod handlers;

/// The shared application state every handler sees: the persistence layer
/// for reads, the process-wide Bot Manager that drives lifecycle
/// transitions, and the Event Bus for the WebSocket fan-out.
#[derive(Clone)]
pub struct AppState {
    pub db: DbRepository,
    pub manager: Arc<BotManager>,
    pub events: Arc<EventBus>,
}

/// Builds and serves the control-plane HTTP/WebSocket router.
/// The caller (the workspace binary) owns connecting to the database and
/// assembling the `BotManager`; this crate only wires routes on top.
pub async fn run_server(addr: SocketAddr, db: DbRepository, manager: Arc<BotManager>, events: Arc<EventBus>) -> anyhow::Result<()> {
    let app_state = Arc::new(AppState { db, manager, events });
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/bots", get(handlers::list_bots).post(handlers::create_bot))
        .route("/api/bots/:bot_id", get(handlers::get_bot))
        .route("/api/bots/:bot_id/start", post(handlers::start_bot))
        .route("/api/bots/:bot_id/stop", post(handlers::stop_bot))
        .route("/api/bots/:bot_id/pause", post(handlers::pause_bot))
        .route("/api/bots/:bot_id/close-positions", post(handlers::close_positions))
        .route("/ws/:bot_id", get(handlers::websocket_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 50));

    tracing::info!(%addr, "control plane listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
