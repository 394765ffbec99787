//! Legacy dashboard alert entity
//!
//! One row per alerting panel. The `settings` blob carries the classic conditions,
//! notification references and no-data/execution-error policies.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "alert")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub version: i64,

    pub dashboard_id: i64,

    pub panel_id: i64,

    pub org_id: i64,

    pub name: String,

    /// Notification message template using `${label}` interpolation
    pub message: String,

    /// Last evaluation state, e.g. `ok`, `alerting` or `paused`
    pub state: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub settings: JsonValue,

    /// Evaluation frequency in seconds
    pub frequency: i64,

    /// Pending period in nanoseconds
    #[sea_orm(column_name = "for")]
    pub for_duration: i64,

    pub created: DateTimeWithTimeZone,

    pub updated: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_paused(&self) -> bool {
        self.state == "paused"
    }
}
