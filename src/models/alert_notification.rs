//! Legacy notification channel entity
//!
//! Channels are addressable by both `uid` and numeric `id` within an organization.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_notification")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub org_id: i64,

    pub uid: String,

    pub name: String,

    /// Integration type, e.g. `slack`, `email` or `webhook`
    #[sea_orm(column_name = "type")]
    pub kind: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub settings: JsonValue,

    /// Map of field name to base64 secret payload
    #[sea_orm(column_type = "JsonBinary")]
    pub secure_settings: Option<JsonValue>,

    /// Default channels receive every alert of the organization
    pub is_default: bool,

    pub disable_resolve_message: bool,

    pub created: DateTimeWithTimeZone,

    pub updated: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
