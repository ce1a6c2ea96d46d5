use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config_settings::load_config;
use engine::BotManager;
use events::EventBus;
use exchange_port::factory::ExchangeFactory;
use persistence::{connect, run_migrations, DbRepository};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pending database migrations and exit.
    Migrate,
    /// Connect to the database, recover persisted bots, and serve the control plane.
    Serve(ServeArgs),
}

#[derive(Parser)]
struct ServeArgs {
    /// Overrides the bind address from configuration.
    #[arg(long, short)]
    addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = load_config()?;
    config_settings::init_tracing(&config.logging)?;

    tracing::info!("chainmakes-rs starting");

    let cli = Cli::parse();
    match cli.command {
        Commands::Migrate => handle_migrate().await?,
        Commands::Serve(args) => handle_serve(args, config).await?,
    }

    tracing::info!("chainmakes-rs finished");
    Ok(())
}

async fn handle_migrate() -> Result<()> {
    let db_pool = connect().await?;
    run_migrations(&db_pool).await?;
    tracing::info!("migrations applied");
    Ok(())
}

/// Wires the persistence layer, the exchange adapter factory, the Event Bus
/// and the Bot Manager, recovers every bot persisted as `running`, then
/// serves the control plane until a shutdown signal arrives.
async fn handle_serve(args: ServeArgs, config: config_settings::AppConfig) -> Result<()> {
    let db_pool = connect().await?;
    run_migrations(&db_pool).await?;
    let db = DbRepository::new(db_pool);

    let factory = ExchangeFactory::new()
        .register(Box::new(exchange_binance::BinanceAdapterBuilder))
        .register(Box::new(exchange_okx::OkxAdapterBuilder))
        .register(Box::new(exchange_mock::MockAdapterBuilder));

    let events = Arc::new(EventBus::new());
    let manager = Arc::new(BotManager::new(db.clone(), factory, events.clone()));

    if let Err(e) = manager.recover_all().await {
        tracing::error!(error = %e, "failed to recover bots on startup");
    }

    let backup_pool = db.pool().clone();
    let backup_dir = PathBuf::from(&config.backup.dir);
    tokio::spawn(persistence::backup::run_daily_backup_loop(backup_pool, backup_dir));

    let addr = args.addr.unwrap_or(config.bind_addr);
    let shutdown_manager = manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received, cleaning up bots");
            shutdown_manager.cleanup().await;
            std::process::exit(0);
        }
    });

    control_plane::run_server(addr, db, manager, events).await
}
