//! Daily archival backup of the operational tables: one JSON file per table
//! under a timestamped directory, a manifest listing what was written, and a
//! 7-day retention sweep. Writes via `tokio::fs` and is driven by
//! `tokio::time::interval` rather than computing a next-2am wakeup by hand.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::{PgPool, Row};
use tokio::fs;

use crate::error::DbError;

const RETENTION_DAYS: i64 = 7;
const BACKUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Serialize)]
struct Manifest {
    created_at: chrono::DateTime<Utc>,
    tables: Vec<String>,
}

/// Runs forever, taking one backup per `BACKUP_INTERVAL` until the caller's
/// task is aborted. The first backup fires immediately on startup.
pub async fn run_daily_backup_loop(pool: PgPool, backup_dir: PathBuf) {
    let mut ticker = tokio::time::interval(BACKUP_INTERVAL);
    loop {
        ticker.tick().await;
        if let Err(err) = perform_backup(&pool, &backup_dir).await {
            tracing::error!(?err, "scheduled backup failed");
        }
        if let Err(err) = cleanup_old_backups(&backup_dir).await {
            tracing::error!(?err, "backup cleanup failed");
        }
    }
}

pub async fn perform_backup(pool: &PgPool, backup_dir: &Path) -> Result<PathBuf, DbError> {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let target = backup_dir.join(format!("backup_{stamp}"));
    fs::create_dir_all(&target).await.map_err(|e| DbError::BackupError(e.to_string()))?;

    let tables = [
        "exchange_accounts",
        "bots",
        "orders",
        "positions",
        "spread_history",
        "trade_logs",
    ];

    for table in tables {
        dump_table(pool, table, &target).await?;
    }

    write_manifest(&target, &tables).await?;
    tracing::info!(path = %target.display(), "backup complete");
    Ok(target)
}

async fn dump_table(pool: &PgPool, table: &str, target: &Path) -> Result<(), DbError> {
    let rows = sqlx::query(&format!("SELECT * FROM {table}")).fetch_all(pool).await?;

    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        values.push(row_to_json(&row));
    }

    let bytes = serde_json::to_vec_pretty(&values)?;
    fs::write(target.join(format!("{table}.json")), bytes)
        .await
        .map_err(|e| DbError::BackupError(e.to_string()))?;
    Ok(())
}

/// Best-effort column dump using the column's declared type name; good
/// enough for an archival snapshot, not a restore format.
fn row_to_json(row: &sqlx::postgres::PgRow) -> serde_json::Value {
    use sqlx::Column;
    use sqlx::TypeInfo;

    let mut map = serde_json::Map::new();
    for column in row.columns() {
        let name = column.name();
        let value = match column.type_info().name() {
            "UUID" => row.try_get::<uuid::Uuid, _>(name).map(|v| serde_json::Value::String(v.to_string())),
            "TEXT" | "VARCHAR" => row.try_get::<String, _>(name).map(serde_json::Value::String),
            "BOOL" => row.try_get::<bool, _>(name).map(serde_json::Value::Bool),
            "INT4" => row.try_get::<i32, _>(name).map(|v| serde_json::Value::Number(v.into())),
            "INT8" => row.try_get::<i64, _>(name).map(|v| serde_json::Value::Number(v.into())),
            "NUMERIC" => row
                .try_get::<rust_decimal::Decimal, _>(name)
                .map(|v| serde_json::Value::String(v.to_string())),
            "TIMESTAMPTZ" => row
                .try_get::<chrono::DateTime<Utc>, _>(name)
                .map(|v| serde_json::Value::String(v.to_rfc3339())),
            "JSONB" | "JSON" => row.try_get::<serde_json::Value, _>(name),
            _ => Ok(serde_json::Value::Null),
        }
        .unwrap_or(serde_json::Value::Null);
        map.insert(name.to_string(), value);
    }
    serde_json::Value::Object(map)
}

async fn write_manifest(target: &Path, tables: &[&str]) -> Result<(), DbError> {
    let manifest = Manifest { created_at: Utc::now(), tables: tables.iter().map(|s| s.to_string()).collect() };
    let bytes = serde_json::to_vec_pretty(&manifest)?;
    fs::write(target.join("manifest.json"), bytes).await.map_err(|e| DbError::BackupError(e.to_string()))?;
    Ok(())
}

async fn cleanup_old_backups(backup_dir: &Path) -> Result<(), DbError> {
    let cutoff = Utc::now() - chrono::Duration::days(RETENTION_DAYS);
    let mut entries = match fs::read_dir(backup_dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    while let Some(entry) = entries.next_entry().await.map_err(|e| DbError::BackupError(e.to_string()))? {
        let Ok(metadata) = entry.metadata().await else { continue };
        let Ok(modified) = metadata.modified() else { continue };
        let modified: chrono::DateTime<Utc> = modified.into();
        if modified < cutoff {
            let _ = fs::remove_dir_all(entry.path()).await;
        }
    }
    Ok(())
}
