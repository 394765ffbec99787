//! Alerting configuration document consumed by the alert router.
//!
//! The JSON shape (snake_case routing keys, `object_matchers` as `[name, op, value]`
//! triples, camelCase integration fields) is what the router loads without conversion.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

static LABEL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatcherError {
    #[error("invalid label name '{0}'")]
    InvalidLabelName(String),
    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "=~")]
    Regexp,
    #[serde(rename = "!~")]
    NotRegexp,
}

/// Label matcher, serialized as `["name", "=", "value"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matcher(pub String, pub MatchType, pub String);

impl Matcher {
    pub fn new(kind: MatchType, name: &str, value: &str) -> Result<Self, MatcherError> {
        if !LABEL_NAME_RE.is_match(name) {
            return Err(MatcherError::InvalidLabelName(name.to_string()));
        }
        if matches!(kind, MatchType::Regexp | MatchType::NotRegexp) {
            Regex::new(&format!("^(?:{value})$")).map_err(|e| MatcherError::InvalidRegex {
                pattern: value.to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(Matcher(name.to_string(), kind, value.to_string()))
    }

    pub fn equal(name: &str, value: &str) -> Result<Self, MatcherError> {
        Self::new(MatchType::Equal, name, value)
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn value(&self) -> &str {
        &self.2
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub receiver: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_matchers: Vec<Matcher>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    #[serde(default, rename = "continue", skip_serializing_if = "std::ops::Not::not")]
    pub continue_matching: bool,
}

/// One migrated channel inside a receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedIntegration {
    pub uid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub disable_resolve_message: bool,
    pub settings: JsonValue,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secure_settings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receiver {
    pub name: String,
    #[serde(default)]
    pub grafana_managed_receiver_configs: Vec<ManagedIntegration>,
}

impl Receiver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grafana_managed_receiver_configs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertingConfig {
    pub route: Route,
    #[serde(default)]
    pub templates: Vec<String>,
    #[serde(default)]
    pub receivers: Vec<Receiver>,
}

/// Root document stored in `alert_configuration.alertmanager_configuration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub template_files: BTreeMap<String, String>,
    pub alertmanager_config: AlertingConfig,
}

impl UserConfig {
    pub fn new(route: Route, receivers: Vec<Receiver>) -> Self {
        Self {
            template_files: BTreeMap::new(),
            alertmanager_config: AlertingConfig {
                route,
                templates: Vec::new(),
                receivers,
            },
        }
    }

    pub fn receiver(&self, name: &str) -> Option<&Receiver> {
        self.alertmanager_config
            .receivers
            .iter()
            .find(|r| r.name == name)
    }
}
