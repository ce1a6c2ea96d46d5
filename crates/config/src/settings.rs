use std::net::SocketAddr;

use serde::Deserialize;

/// The root configuration structure for the control-plane binary. Scoped to
/// process-level concerns (HTTP bind address, logging, backups) — not
/// strategy parameters, which live on the `Bot` row itself and are loaded
/// through the persistence layer instead.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub backup: BackupConfig,
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:3000".parse().expect("default bind address is valid")
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub dir: String,
}

fn default_backup_dir() -> String {
    "backups".to_string()
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self { dir: default_backup_dir() }
    }
}
