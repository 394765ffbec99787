//! Construction of unified alert rules from legacy dashboard alerts.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use super::condition::{AlertQuery, Condition};
use super::duration;
use super::settings::DashAlertSettings;
use super::template;
use crate::models::legacy_alert;

/// Title length accepted by the rule store, suffix included.
pub const MAX_TITLE_LEN: usize = 190;
const MIN_INTERVAL_SECONDS: i64 = 10;

pub const DASHBOARD_UID_ANNOTATION: &str = "__dashboardUid__";
pub const PANEL_ID_ANNOTATION: &str = "__panelId__";
pub const ALERT_ID_ANNOTATION: &str = "__alertId__";
pub const MESSAGE_ANNOTATION: &str = "message";
pub const RULE_UID_LABEL: &str = "rule_uid";
pub const ALERT_NAME_LABEL: &str = "alertname";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("unrecognized no_data_state setting '{0}'")]
    UnknownNoDataState(String),
    #[error("unrecognized execution_error_state setting '{0}'")]
    UnknownExecErrState(String),
}

/// Rule state when a query returns no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoDataState {
    Alerting,
    NoData,
    Ok,
}

impl NoDataState {
    pub fn from_legacy(value: &str) -> Result<Self, RuleError> {
        match value {
            "ok" => Ok(NoDataState::Ok),
            "" | "no_data" => Ok(NoDataState::NoData),
            "alerting" | "keep_state" => Ok(NoDataState::Alerting),
            other => Err(RuleError::UnknownNoDataState(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NoDataState::Alerting => "Alerting",
            NoDataState::NoData => "NoData",
            NoDataState::Ok => "OK",
        }
    }
}

impl fmt::Display for NoDataState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule state when evaluation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrState {
    Alerting,
}

impl ExecErrState {
    pub fn from_legacy(value: &str) -> Result<Self, RuleError> {
        match value {
            "" | "alerting" | "keep_state" => Ok(ExecErrState::Alerting),
            other => Err(RuleError::UnknownExecErrState(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecErrState::Alerting => "Alerting",
        }
    }
}

impl fmt::Display for ExecErrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    pub org_id: i64,
    pub uid: String,
    pub title: String,
    pub condition: String,
    pub data: Vec<AlertQuery>,
    pub interval_seconds: i64,
    pub version: i64,
    pub namespace_uid: String,
    pub rule_group: String,
    pub no_data_state: NoDataState,
    pub exec_err_state: ExecErrState,
    pub for_seconds: i64,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub updated: DateTime<Utc>,
}

/// First stored revision of a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRuleVersion {
    pub rule: AlertRule,
    pub parent_version: i64,
    pub restored_from: i64,
    pub created: DateTime<Utc>,
}

impl AlertRuleVersion {
    pub fn initial(rule: &AlertRule) -> Self {
        Self {
            rule: AlertRule {
                version: 1,
                ..rule.clone()
            },
            parent_version: 0,
            restored_from: 0,
            created: rule.updated,
        }
    }
}

/// Where a rule lands and what it is called.
#[derive(Debug, Clone)]
pub struct RulePlacement {
    pub uid: String,
    pub title: String,
    pub namespace_uid: String,
    pub dashboard_uid: String,
}

/// Everything produced for one legacy alert.
#[derive(Debug, Clone)]
pub struct BuiltRule {
    pub rule: AlertRule,
    pub version: AlertRuleVersion,
    /// Set when the legacy alert was paused and needs a silence
    pub paused: bool,
}

/// Builds the rule and its first version from a translated condition.
pub fn build_rule(
    alert: &legacy_alert::Model,
    settings: &DashAlertSettings,
    condition: Condition,
    placement: RulePlacement,
    now: DateTime<Utc>,
) -> Result<BuiltRule, RuleError> {
    let no_data_state = NoDataState::from_legacy(&settings.no_data_state)?;
    let exec_err_state = ExecErrState::from_legacy(&settings.execution_error_state)?;

    let mut annotations = BTreeMap::from([
        (DASHBOARD_UID_ANNOTATION.to_string(), placement.dashboard_uid),
        (PANEL_ID_ANNOTATION.to_string(), alert.panel_id.to_string()),
        (ALERT_ID_ANNOTATION.to_string(), alert.id.to_string()),
    ]);
    if !alert.message.is_empty() {
        annotations.insert(
            MESSAGE_ANNOTATION.to_string(),
            template::migrate_template(&alert.message),
        );
    }

    let mut labels = settings.alert_rule_tags.clone();
    labels.insert(ALERT_NAME_LABEL.to_string(), placement.title.clone());
    labels.insert(RULE_UID_LABEL.to_string(), placement.uid.clone());

    let mut data = condition.data;
    for query in &mut data {
        if let JsonValue::Object(model) = &mut query.model {
            model.remove("hide");
        }
    }

    let rule = AlertRule {
        org_id: alert.org_id,
        uid: placement.uid,
        title: placement.title,
        condition: condition.condition,
        data,
        interval_seconds: adjust_interval(alert.frequency),
        version: 1,
        namespace_uid: placement.namespace_uid,
        rule_group: alert.name.clone(),
        no_data_state,
        exec_err_state,
        for_seconds: duration::nanos_to_seconds(alert.for_duration),
        annotations,
        labels,
        updated: now,
    };
    let version = AlertRuleVersion::initial(&rule);

    Ok(BuiltRule {
        rule,
        version,
        paused: alert.is_paused(),
    })
}

/// Rounds a polling frequency down to a multiple of 10 seconds, never below 10.
pub fn adjust_interval(frequency: i64) -> i64 {
    if frequency <= MIN_INTERVAL_SECONDS {
        return MIN_INTERVAL_SECONDS;
    }
    frequency - frequency % MIN_INTERVAL_SECONDS
}

/// Hands out titles unique per (org, folder).
#[derive(Debug, Default)]
pub struct TitleDeduplicator {
    used: HashMap<(i64, String), HashSet<String>>,
}

impl TitleDeduplicator {
    pub fn deduplicate(&mut self, org_id: i64, namespace_uid: &str, title: &str) -> String {
        let used = self
            .used
            .entry((org_id, namespace_uid.to_string()))
            .or_default();

        let base = truncate(title, MAX_TITLE_LEN);
        if used.insert(base.clone()) {
            return base;
        }
        let mut n = 2usize;
        loop {
            let suffix = format!(" #{n}");
            let candidate = format!(
                "{}{}",
                truncate(title, MAX_TITLE_LEN.saturating_sub(suffix.len())),
                suffix
            );
            if used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upgrade::condition::RelativeTimeRange;
    use serde_json::json;

    fn legacy(state: &str, message: &str) -> legacy_alert::Model {
        let now = Utc::now().into();
        legacy_alert::Model {
            id: 42,
            version: 0,
            dashboard_id: 3,
            panel_id: 7,
            org_id: 1,
            name: "High CPU".to_string(),
            message: message.to_string(),
            state: state.to_string(),
            settings: json!({}),
            frequency: 65,
            for_duration: 300_000_000_000,
            created: now,
            updated: now,
        }
    }

    fn condition() -> Condition {
        Condition {
            condition: "B".to_string(),
            org_id: 1,
            data: vec![AlertQuery {
                ref_id: "A".to_string(),
                query_type: String::new(),
                relative_time_range: RelativeTimeRange { from: 300, to: 0 },
                datasource_uid: "prom".to_string(),
                model: json!({"refId": "A", "hide": false, "expr": "up"}),
            }],
            source_ref_ids: BTreeMap::from([("A".to_string(), "A".to_string())]),
        }
    }

    fn placement() -> RulePlacement {
        RulePlacement {
            uid: "rule-uid-1".to_string(),
            title: "High CPU".to_string(),
            namespace_uid: "folder-1".to_string(),
            dashboard_uid: "dash-1".to_string(),
        }
    }

    #[test]
    fn builds_rule_with_traceability_fields() {
        let mut settings = DashAlertSettings::default();
        settings.alert_rule_tags.insert("team".to_string(), "ops".to_string());

        let built = build_rule(
            &legacy("ok", "${instance} is hot"),
            &settings,
            condition(),
            placement(),
            Utc::now(),
        )
        .unwrap();
        let rule = &built.rule;

        assert_eq!(rule.uid, "rule-uid-1");
        assert_eq!(rule.rule_group, "High CPU");
        assert_eq!(rule.namespace_uid, "folder-1");
        assert_eq!(rule.interval_seconds, 60);
        assert_eq!(rule.for_seconds, 300);
        assert_eq!(rule.version, 1);
        assert_eq!(rule.no_data_state, NoDataState::NoData);
        assert_eq!(rule.exec_err_state, ExecErrState::Alerting);
        assert_eq!(rule.annotations[DASHBOARD_UID_ANNOTATION], "dash-1");
        assert_eq!(rule.annotations[PANEL_ID_ANNOTATION], "7");
        assert_eq!(rule.annotations[ALERT_ID_ANNOTATION], "42");
        assert!(rule.annotations[MESSAGE_ANNOTATION].ends_with("{{$labels.instance}} is hot"));
        assert_eq!(rule.labels[RULE_UID_LABEL], "rule-uid-1");
        assert_eq!(rule.labels[ALERT_NAME_LABEL], "High CPU");
        assert_eq!(rule.labels["team"], "ops");
        assert!(rule.data[0].model.get("hide").is_none());
        assert!(!built.paused);

        assert_eq!(built.version.rule, *rule);
        assert_eq!(built.version.parent_version, 0);
        assert_eq!(built.version.restored_from, 0);
    }

    #[test]
    fn empty_message_has_no_annotation_and_paused_is_flagged() {
        let built = build_rule(
            &legacy("paused", ""),
            &DashAlertSettings::default(),
            condition(),
            placement(),
            Utc::now(),
        )
        .unwrap();
        assert!(!built.rule.annotations.contains_key(MESSAGE_ANNOTATION));
        assert!(built.paused);
    }

    #[test]
    fn state_mappings_are_exhaustive() {
        assert_eq!(NoDataState::from_legacy("ok"), Ok(NoDataState::Ok));
        assert_eq!(NoDataState::from_legacy(""), Ok(NoDataState::NoData));
        assert_eq!(NoDataState::from_legacy("no_data"), Ok(NoDataState::NoData));
        assert_eq!(NoDataState::from_legacy("alerting"), Ok(NoDataState::Alerting));
        assert_eq!(NoDataState::from_legacy("keep_state"), Ok(NoDataState::Alerting));
        assert_eq!(
            NoDataState::from_legacy("OK"),
            Err(RuleError::UnknownNoDataState("OK".to_string()))
        );
        assert_eq!(NoDataState::Ok.as_str(), "OK");

        for value in ["", "alerting", "keep_state"] {
            assert_eq!(ExecErrState::from_legacy(value), Ok(ExecErrState::Alerting));
        }
        assert_eq!(
            ExecErrState::from_legacy("ok"),
            Err(RuleError::UnknownExecErrState("ok".to_string()))
        );
    }

    #[test]
    fn unknown_state_fails_the_build() {
        let settings = DashAlertSettings {
            no_data_state: "maybe".to_string(),
            ..DashAlertSettings::default()
        };
        let err = build_rule(&legacy("ok", ""), &settings, condition(), placement(), Utc::now())
            .unwrap_err();
        assert_eq!(err, RuleError::UnknownNoDataState("maybe".to_string()));
    }

    #[test]
    fn interval_rounds_down_with_floor() {
        assert_eq!(adjust_interval(0), 10);
        assert_eq!(adjust_interval(5), 10);
        assert_eq!(adjust_interval(10), 10);
        assert_eq!(adjust_interval(19), 10);
        assert_eq!(adjust_interval(20), 20);
        assert_eq!(adjust_interval(125), 120);
    }

    #[test]
    fn titles_are_unique_per_folder() {
        let mut dedup = TitleDeduplicator::default();
        assert_eq!(dedup.deduplicate(1, "f1", "CPU"), "CPU");
        assert_eq!(dedup.deduplicate(1, "f1", "CPU"), "CPU #2");
        assert_eq!(dedup.deduplicate(1, "f1", "CPU"), "CPU #3");
        assert_eq!(dedup.deduplicate(1, "f2", "CPU"), "CPU");
        assert_eq!(dedup.deduplicate(2, "f1", "CPU"), "CPU");
    }

    #[test]
    fn long_titles_are_truncated_with_room_for_suffix() {
        let mut dedup = TitleDeduplicator::default();
        let long = "x".repeat(250);
        let first = dedup.deduplicate(1, "f", &long);
        assert_eq!(first.chars().count(), MAX_TITLE_LEN);
        let second = dedup.deduplicate(1, "f", &long);
        assert_eq!(second.chars().count(), MAX_TITLE_LEN);
        assert!(second.ends_with(" #2"));
    }
}
