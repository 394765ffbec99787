//! # Error Handling
//!
//! Top level errors of the upgrade. Component errors are wrapped with the record they
//! were raised for, so a failed pass names the alert or organization at fault.

use sea_orm::DbErr;
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::upgrade::channel::ChannelError;
use crate::upgrade::condition::ConditionError;
use crate::upgrade::rule::RuleError;
use crate::upgrade::settings::SettingsError;
use crate::upgrade::silence::SilenceError;

/// Failure to migrate one legacy alert.
#[derive(Debug, Error)]
pub enum AlertMigrationError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("translate conditions: {0}")]
    Condition(#[from] ConditionError),
    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// Any of these aborts the whole pass.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("migrate alert '{name}': {source}")]
    Alert {
        alert_id: i64,
        name: String,
        #[source]
        source: AlertMigrationError,
    },
    #[error("rule '{title}' conflicts with an existing rule in org {org_id}")]
    DuplicateRule {
        org_id: i64,
        title: String,
        #[source]
        source: DbErr,
    },
    #[error("migrate notification channels of org {org_id}: {source}")]
    Channels {
        org_id: i64,
        #[source]
        source: ChannelError,
    },
    #[error("serialize alerting configuration of org {org_id}: {source}")]
    Serialization {
        org_id: i64,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Silences(#[from] SilenceError),
    #[error("secret key is not configured")]
    MissingSecretKey,
    #[error("invalid secret key: {0}")]
    SecretKey(#[source] CryptoError),
}

impl MigrationError {
    pub fn alert(alert_id: i64, name: &str, source: impl Into<AlertMigrationError>) -> Self {
        MigrationError::Alert {
            alert_id,
            name: name.to_string(),
            source: source.into(),
        }
    }
}

/// Whether a database error is a unique constraint violation.
pub fn is_unique_violation(error: &DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error
        .code()
        .is_some_and(|code| code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code.as_ref()))
}
