//! Dashboard entity model
//!
//! Dashboards and folders share the `dashboard` table; folders have `is_folder` set and
//! dashboards point at their folder through `folder_id` (0 for the root).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "dashboard")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub org_id: i64,

    pub uid: String,

    pub title: String,

    /// Id of the containing folder, 0 when the dashboard lives in the root
    pub folder_id: i64,

    pub is_folder: bool,

    /// Dashboard JSON model including the panel tree
    #[sea_orm(column_type = "JsonBinary")]
    pub data: JsonValue,

    pub created: DateTimeWithTimeZone,

    pub updated: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
