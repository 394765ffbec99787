//! Database connection management and the upgrade ledger.
//!
//! Connections go through a SeaORM pool (SQLite or Postgres). The ledger lives in
//! `migration_log` and records which upgrade steps already ran.

use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbErr, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::AppConfig;
use crate::models::migration_log;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {source}")]
    ConnectionFailed {
        #[from]
        source: sea_orm::DbErr,
    },
    #[error("Database connection timeout after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },
    #[error("Invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
}

/// Initializes a database connection pool with the given configuration.
///
/// Transient connection errors are retried with exponential backoff.
///
/// ```no_run
/// use alerting_upgrade::{config::AppConfig, db::init_pool};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::default();
///     let db = init_pool(&config).await?;
///     Ok(())
/// }
/// ```
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection> {
    if cfg.database_url.is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "Database URL cannot be empty".to_string(),
        }
        .into());
    }

    let mut opt = ConnectOptions::new(&cfg.database_url);
    opt.max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let max_retries = 5;
    let mut retry_delay = Duration::from_millis(100);

    for attempt in 1..=max_retries {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                log::info!("Connected to database (attempt {})", attempt);
                return Ok(conn);
            }
            Err(e) => {
                if attempt == max_retries {
                    log::error!(
                        "Failed to connect to database after {} attempts: {}",
                        max_retries,
                        e
                    );
                    return Err(DatabaseError::ConnectionFailed { source: e }.into());
                }

                log::warn!(
                    "Database connection attempt {} failed: {}, retrying in {:?}",
                    attempt,
                    e,
                    retry_delay
                );

                sleep(retry_delay).await;
                retry_delay *= 2;
            }
        }
    }

    Err(DatabaseError::ConnectionTimeout {
        timeout_ms: cfg.db_acquire_timeout_ms,
    }
    .into())
}

/// Verifies that the database connection is still usable.
pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    use sea_orm::Statement;

    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());
    db.query_one(stmt)
        .await
        .context("Database health check failed")?;
    Ok(())
}

/// Whether a step with this id has a successful ledger entry.
pub async fn migration_applied<C: ConnectionTrait>(conn: &C, migration_id: &str) -> Result<bool, DbErr> {
    let count = migration_log::Entity::find()
        .filter(migration_log::Column::MigrationId.eq(migration_id))
        .filter(migration_log::Column::Success.eq(true))
        .count(conn)
        .await?;
    Ok(count > 0)
}

/// Appends a ledger entry for a step.
pub async fn record_migration<C: ConnectionTrait>(
    conn: &C,
    migration_id: &str,
    success: bool,
    error: &str,
) -> Result<(), DbErr> {
    migration_log::ActiveModel {
        migration_id: Set(migration_id.to_string()),
        sql: Set(String::new()),
        success: Set(success),
        error: Set(error.to_string()),
        timestamp: Set(Utc::now().into()),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(())
}
