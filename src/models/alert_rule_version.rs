//! Unified alert rule revision entity

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_rule_version")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub rule_org_id: i64,
    pub rule_uid: String,
    pub rule_namespace_uid: String,
    pub rule_group: String,
    pub parent_version: i64,
    pub restored_from: i64,
    pub version: i64,
    pub created: DateTimeWithTimeZone,
    pub title: String,
    pub condition: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub data: JsonValue,
    pub interval_seconds: i64,
    pub no_data_state: String,
    pub exec_err_state: String,
    #[sea_orm(column_name = "for")]
    pub for_seconds: i64,
    #[sea_orm(column_type = "JsonBinary")]
    pub annotations: JsonValue,
    #[sea_orm(column_type = "JsonBinary")]
    pub labels: JsonValue,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
