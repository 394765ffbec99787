//! Writes of migrated rules and alerting configuration documents.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::models::{
    AlertConfiguration, AlertRule as AlertRuleEntity, alert_configuration, alert_rule,
    alert_rule_version,
};
use crate::upgrade::rule::{AlertRule, AlertRuleVersion};

pub const CONFIGURATION_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy)]
pub struct UnifiedAlertingRepository<'a, C> {
    conn: &'a C,
}

fn to_json<T: Serialize>(value: &T) -> Result<JsonValue, DbErr> {
    serde_json::to_value(value).map_err(|e| DbErr::Json(e.to_string()))
}

impl<'a, C: ConnectionTrait> UnifiedAlertingRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn insert_rule(&self, rule: &AlertRule) -> Result<alert_rule::Model, DbErr> {
        alert_rule::ActiveModel {
            org_id: Set(rule.org_id),
            title: Set(rule.title.clone()),
            condition: Set(rule.condition.clone()),
            data: Set(to_json(&rule.data)?),
            updated: Set(rule.updated.into()),
            interval_seconds: Set(rule.interval_seconds),
            version: Set(rule.version),
            uid: Set(rule.uid.clone()),
            namespace_uid: Set(rule.namespace_uid.clone()),
            rule_group: Set(rule.rule_group.clone()),
            no_data_state: Set(rule.no_data_state.as_str().to_string()),
            exec_err_state: Set(rule.exec_err_state.as_str().to_string()),
            for_seconds: Set(rule.for_seconds),
            annotations: Set(to_json(&rule.annotations)?),
            labels: Set(to_json(&rule.labels)?),
            ..Default::default()
        }
        .insert(self.conn)
        .await
    }

    pub async fn insert_rule_version(
        &self,
        version: &AlertRuleVersion,
    ) -> Result<alert_rule_version::Model, DbErr> {
        let rule = &version.rule;
        alert_rule_version::ActiveModel {
            rule_org_id: Set(rule.org_id),
            rule_uid: Set(rule.uid.clone()),
            rule_namespace_uid: Set(rule.namespace_uid.clone()),
            rule_group: Set(rule.rule_group.clone()),
            parent_version: Set(version.parent_version),
            restored_from: Set(version.restored_from),
            version: Set(rule.version),
            created: Set(version.created.into()),
            title: Set(rule.title.clone()),
            condition: Set(rule.condition.clone()),
            data: Set(to_json(&rule.data)?),
            interval_seconds: Set(rule.interval_seconds),
            no_data_state: Set(rule.no_data_state.as_str().to_string()),
            exec_err_state: Set(rule.exec_err_state.as_str().to_string()),
            for_seconds: Set(rule.for_seconds),
            annotations: Set(to_json(&rule.annotations)?),
            labels: Set(to_json(&rule.labels)?),
            ..Default::default()
        }
        .insert(self.conn)
        .await
    }

    /// Stores a serialized configuration document for an organization.
    pub async fn insert_configuration(
        &self,
        org_id: i64,
        document: String,
        created_at: DateTime<Utc>,
    ) -> Result<alert_configuration::Model, DbErr> {
        alert_configuration::ActiveModel {
            org_id: Set(org_id),
            alertmanager_configuration: Set(document),
            configuration_version: Set(CONFIGURATION_VERSION.to_string()),
            is_default: Set(false),
            created_at: Set(created_at.into()),
            ..Default::default()
        }
        .insert(self.conn)
        .await
    }

    pub async fn list_rules(&self, org_id: i64) -> Result<Vec<alert_rule::Model>, DbErr> {
        AlertRuleEntity::find()
            .filter(alert_rule::Column::OrgId.eq(org_id))
            .order_by_asc(alert_rule::Column::Id)
            .all(self.conn)
            .await
    }

    pub async fn find_configuration(
        &self,
        org_id: i64,
    ) -> Result<Option<alert_configuration::Model>, DbErr> {
        AlertConfiguration::find()
            .filter(alert_configuration::Column::OrgId.eq(org_id))
            .order_by_desc(alert_configuration::Column::Id)
            .one(self.conn)
            .await
    }
}
