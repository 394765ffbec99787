//! Configuration loading for the alerting upgrade.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `UALERT_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "UALERT_";

/// Application configuration derived from `UALERT_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<Vec<u8>>,
    #[serde(default)]
    pub upgrade: UpgradeConfig,
}

/// Knobs for the dashboard alerting to unified alerting upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct UpgradeConfig {
    /// Operator confirmation that a database backup exists. Without it the upgrade is a no-op.
    ///
    /// Environment variable: `UALERT_UPGRADE_BACKUP_ACKNOWLEDGED`
    #[serde(default)]
    pub backup_acknowledged: bool,

    /// How alerts linked to several channels are routed.
    ///
    /// Environment variable: `UALERT_UPGRADE_ROUTE_STRATEGY`
    #[serde(default)]
    pub route_strategy: RouteStrategy,

    /// Promote the lowest-id channel of an organization to default when none is flagged.
    ///
    /// Environment variable: `UALERT_UPGRADE_PROMOTE_FIRST_CHANNEL_AS_DEFAULT`
    #[serde(default = "default_promote_first_channel_as_default")]
    pub promote_first_channel_as_default: bool,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            backup_acknowledged: false,
            route_strategy: RouteStrategy::default(),
            promote_first_channel_as_default: default_promote_first_channel_as_default(),
        }
    }
}

/// Receiver layout for alerts that notify more than one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStrategy {
    /// One synthetic receiver bundling the whole channel set, reached by a leaf route.
    #[default]
    Bundled,
    /// One receiver per channel, reached through `continue` child routes.
    FanOut,
}

impl RouteStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStrategy::Bundled => "bundled",
            RouteStrategy::FanOut => "fan_out",
        }
    }
}

impl fmt::Display for RouteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "bundled" => Ok(RouteStrategy::Bundled),
            "fan_out" | "fanout" => Ok(RouteStrategy::FanOut),
            _ => Err(ConfigError::InvalidRouteStrategy {
                value: value.to_string(),
            }),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            data_path: default_data_path(),
            secret_key: None,
            upgrade: UpgradeConfig::default(),
        }
    }
}

impl AppConfig {
    /// Location of the silence store written by the upgrade.
    pub fn silences_path(&self) -> PathBuf {
        self.data_path.join("alerting").join("silences")
    }

    /// Returns a pretty JSON representation of the config with secrets redacted.
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.secret_key.is_some() {
            config.secret_key = Some(b"[REDACTED]".to_vec());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    ///
    /// The secret key is only required once the backup is acknowledged; an unacknowledged
    /// run never touches channel secrets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.secret_key {
            Some(ref key) if key.len() != 32 => {
                return Err(ConfigError::InvalidSecretKeyLength { length: key.len() });
            }
            Some(_) => {}
            None if self.upgrade.backup_acknowledged => return Err(ConfigError::MissingSecretKey),
            None => {}
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        if self.database_url.trim().is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        if self.data_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingDataPath);
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://alerting.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    5
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data")
}

fn default_promote_first_channel_as_default() -> bool {
    true
}

/// Parses the boolean spellings accepted for flags.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("secret key is missing; set UALERT_SECRET_KEY environment variable")]
    MissingSecretKey,
    #[error("secret key is invalid base64: {error}")]
    InvalidSecretKeyBase64 { error: String },
    #[error("secret key must decode to exactly 32 bytes, got {length} bytes")]
    InvalidSecretKeyLength { length: usize },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("database url is empty; set UALERT_DATABASE_URL")]
    MissingDatabaseUrl,
    #[error("data path is empty; set UALERT_DATA_PATH")]
    MissingDataPath,
    #[error("invalid value '{value}' for {key}; expected a boolean")]
    InvalidFlag { key: String, value: String },
    #[error("route strategy must be 'bundled' or 'fan_out', got '{value}'")]
    InvalidRouteStrategy { value: String },
}

/// Loads configuration using layered `.env` files and `UALERT_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates the configuration. Process environment wins over env files.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);
        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);
        let data_path = layered
            .remove("DATA_PATH")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_path);

        let secret_key = match layered.remove("SECRET_KEY").filter(|v| !v.is_empty()) {
            Some(key_str) => {
                use base64::{Engine as _, engine::general_purpose};
                Some(general_purpose::STANDARD.decode(key_str.trim()).map_err(|e| {
                    ConfigError::InvalidSecretKeyBase64 {
                        error: e.to_string(),
                    }
                })?)
            }
            None => None,
        };

        let backup_acknowledged = take_flag(&mut layered, "UPGRADE_BACKUP_ACKNOWLEDGED")?
            .unwrap_or(false);
        let promote_first_channel_as_default =
            take_flag(&mut layered, "UPGRADE_PROMOTE_FIRST_CHANNEL_AS_DEFAULT")?
                .unwrap_or_else(default_promote_first_channel_as_default);
        let route_strategy = match layered
            .remove("UPGRADE_ROUTE_STRATEGY")
            .filter(|v| !v.is_empty())
        {
            Some(value) => value.parse()?,
            None => RouteStrategy::default(),
        };

        let config = AppConfig {
            profile,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            data_path,
            secret_key,
            upgrade: UpgradeConfig {
                backup_acknowledged,
                route_strategy,
                promote_first_channel_as_default,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("UALERT_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_flag(
    layered: &mut BTreeMap<String, String>,
    key: &str,
) -> Result<Option<bool>, ConfigError> {
    match layered.remove(key) {
        Some(value) => parse_flag(&value)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidFlag {
                key: format!("{ENV_PREFIX}{key}"),
                value,
            }),
        None => Ok(None),
    }
}
