//! Migration to create the upgrade ledger.
//!
//! One row per executed upgrade step; a successful row means the step must not run again.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MigrationLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MigrationLog::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MigrationLog::MigrationId).text().not_null())
                    .col(ColumnDef::new(MigrationLog::Sql).text().not_null().default(""))
                    .col(ColumnDef::new(MigrationLog::Success).boolean().not_null())
                    .col(ColumnDef::new(MigrationLog::Error).text().not_null().default(""))
                    .col(
                        ColumnDef::new(MigrationLog::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_migration_log_migration_id")
                    .table(MigrationLog::Table)
                    .col(MigrationLog::MigrationId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MigrationLog::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MigrationLog {
    Table,
    Id,
    MigrationId,
    Sql,
    Success,
    Error,
    Timestamp,
}
