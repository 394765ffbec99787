//! Unified alert rule entity

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_rule")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub org_id: i64,

    pub title: String,

    /// RefID of the query or expression whose result decides the alert state
    pub condition: String,

    /// Ordered query and expression graph
    #[sea_orm(column_type = "JsonBinary")]
    pub data: JsonValue,

    pub updated: DateTimeWithTimeZone,

    pub interval_seconds: i64,

    pub version: i64,

    pub uid: String,

    /// Folder uid the rule lives in
    pub namespace_uid: String,

    pub rule_group: String,

    pub no_data_state: String,

    pub exec_err_state: String,

    /// Pending period in seconds
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
