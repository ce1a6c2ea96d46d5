use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;
use crate::settings::{BackupConfig, Config, LoggingConfig};

pub mod error;
pub mod settings;

pub use settings::Config as AppConfig;

/// Loads the control-plane's configuration from `config.toml`, falling back
/// to the field defaults.
pub fn load_config() -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name("config.toml").required(false))
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;

    builder.try_deserialize::<Config>().or_else(|_| {
        Ok(Config { bind_addr: "0.0.0.0:3000".parse().unwrap(), logging: LoggingConfig::default(), backup: BackupConfig::default() })
    })
}

/// Initializes `tracing` with an `EnvFilter` seeded from `logging.level`,
/// overridable at runtime via `RUST_LOG`.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}
