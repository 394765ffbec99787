//! Upgrade ledger entity

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "migration_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub migration_id: String,
    #[sea_orm(column_type = "Text")]
    pub sql: String,
    pub success: bool,
    #[sea_orm(column_type = "Text")]
    pub error: String,
    pub timestamp: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
