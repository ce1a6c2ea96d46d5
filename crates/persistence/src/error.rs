use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("failed to connect to the database: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("an error occurred during JSON serialization/deserialization: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("an error occurred writing the backup archive: {0}")]
    BackupError(String),

    #[error("the requested data was not found in the database")]
    NotFound,
}
