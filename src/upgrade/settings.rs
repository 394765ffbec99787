//! Typed views over the legacy JSON settings blobs.
//!
//! Alert and channel settings are stored as loosely typed JSON. They are parsed once into
//! the structures below; every later stage works on these types only.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid alert settings: {0}")]
    Alert(#[source] serde_json::Error),
    #[error("channel settings must be a JSON object, got {found}")]
    ChannelNotObject { found: &'static str },
    #[error("secure settings must be an object of strings: {0}")]
    SecureSettings(#[source] serde_json::Error),
}

/// Parsed `alert.settings`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashAlertSettings {
    #[serde(default)]
    pub no_data_state: String,
    #[serde(default)]
    pub execution_error_state: String,
    #[serde(default)]
    pub conditions: Vec<DashAlertCondition>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub alert_rule_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub notifications: Vec<NotificationKey>,
}

impl DashAlertSettings {
    pub fn parse(settings: &JsonValue) -> Result<Self, SettingsError> {
        if settings.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(settings.clone()).map_err(SettingsError::Alert)
    }
}

/// One classic condition: a reducer over a query compared by an evaluator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DashAlertCondition {
    #[serde(default)]
    pub evaluator: ConditionEvaluator,
    #[serde(default)]
    pub operator: ConditionType,
    pub query: ConditionQuery,
    #[serde(default)]
    pub reducer: ConditionType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionEvaluator {
    #[serde(default)]
    pub params: Vec<f64>,
    #[serde(default, rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionType {
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// `params` is `[refID, from, to]`, e.g. `["A", "5m", "now"]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionQuery {
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub datasource_id: i64,
    #[serde(default)]
    pub model: JsonValue,
}

/// Reference from an alert to a notification channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotificationKey {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub id: Option<i64>,
}

/// Alert tags were free-form in old dashboards; non-string values are stringified.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, JsonValue>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                JsonValue::String(s) => s,
                JsonValue::Null => String::new(),
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

/// Parsed `alert_notification.settings`; integration specific, so kept as an object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSettings(pub Map<String, JsonValue>);

impl ChannelSettings {
    pub fn parse(settings: &JsonValue) -> Result<Self, SettingsError> {
        match settings {
            JsonValue::Object(map) => Ok(Self(map.clone())),
            JsonValue::Null => Ok(Self::default()),
            other => Err(SettingsError::ChannelNotObject {
                found: json_kind(other),
            }),
        }
    }

    /// Removes a string field, returning it when present and non-empty.
    pub fn take_string(&mut self, key: &str) -> Option<String> {
        match self.0.remove(key) {
            Some(JsonValue::String(s)) if !s.is_empty() => Some(s),
            Some(JsonValue::String(_)) | None => None,
            Some(other) => {
                // Not a secret-shaped value; put it back.
                self.0.insert(key.to_string(), other);
                None
            }
        }
    }

    pub fn into_value(self) -> JsonValue {
        JsonValue::Object(self.0)
    }
}

/// Parses `alert_notification.secure_settings` into field → encoded payload.
pub fn parse_secure_settings(
    value: Option<&JsonValue>,
) -> Result<BTreeMap<String, String>, SettingsError> {
    match value {
        None | Some(JsonValue::Null) => Ok(BTreeMap::new()),
        Some(value) => serde_json::from_value(value.clone()).map_err(SettingsError::SecureSettings),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
