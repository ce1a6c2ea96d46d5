use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("exchange error: {0}")]
    Exchange(#[from] exchange_port::ExchangeError),

    #[error("database error: {0}")]
    Database(#[from] persistence::DbError),

    #[error("bot {0} not found")]
    BotNotFound(uuid::Uuid),

    #[error("bot {0} is already running")]
    AlreadyRunning(uuid::Uuid),

    #[error("exchange '{0}' has no registered adapter")]
    UnknownExchange(String),
}
