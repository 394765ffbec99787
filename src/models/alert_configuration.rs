//! Per-organization alerting configuration document (receivers and routing tree).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_configuration")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub org_id: i64,

    /// Serialized JSON document loaded by the alert router
    #[sea_orm(column_type = "Text")]
    pub alertmanager_configuration: String,

    pub configuration_version: String,

    #[sea_orm(column_name = "default")]
    pub is_default: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
