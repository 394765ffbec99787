//! Migration to create the legacy dashboard alerting tables.
//!
//! These mirror the tables that dashboard alerting kept: datasources, dashboards (and
//! folders), panel alerts and notification channels.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DataSource::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DataSource::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DataSource::OrgId).big_integer().not_null())
                    .col(
                        ColumnDef::new(DataSource::Uid)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(DataSource::Name).text().not_null())
                    .col(ColumnDef::new(DataSource::Type).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_data_source_org_id")
                    .table(DataSource::Table)
                    .col(DataSource::OrgId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Dashboard::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Dashboard::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Dashboard::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(Dashboard::Uid).text().not_null())
                    .col(ColumnDef::new(Dashboard::Title).text().not_null())
                    .col(
                        ColumnDef::new(Dashboard::FolderId)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Dashboard::IsFolder)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Dashboard::Data).json_binary().not_null())
                    .col(
                        ColumnDef::new(Dashboard::Created)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Dashboard::Updated)
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
                    .name("uq_dashboard_org_id_uid")
                    .table(Dashboard::Table)
                    .col(Dashboard::OrgId)
                    .col(Dashboard::Uid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Alert::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alert::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Alert::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Alert::DashboardId).big_integer().not_null())
                    .col(ColumnDef::new(Alert::PanelId).big_integer().not_null())
                    .col(ColumnDef::new(Alert::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(Alert::Name).text().not_null())
                    .col(ColumnDef::new(Alert::Message).text().not_null().default(""))
                    .col(
                        ColumnDef::new(Alert::State)
                            .text()
                            .not_null()
                            .default("unknown"),
                    )
                    .col(ColumnDef::new(Alert::Settings).json_binary().not_null())
                    .col(
                        ColumnDef::new(Alert::Frequency)
                            .big_integer()
                            .not_null()
                            .default(60),
                    )
                    .col(
                        ColumnDef::new(Alert::For)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Alert::Created)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Alert::Updated)
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
                    .name("idx_alert_org_id_dashboard_id")
                    .table(Alert::Table)
                    .col(Alert::OrgId)
                    .col(Alert::DashboardId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AlertNotification::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertNotification::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AlertNotification::OrgId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertNotification::Uid)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(AlertNotification::Name).text().not_null())
                    .col(ColumnDef::new(AlertNotification::Type).text().not_null())
                    .col(
                        ColumnDef::new(AlertNotification::Settings)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertNotification::SecureSettings)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AlertNotification::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AlertNotification::DisableResolveMessage)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AlertNotification::Created)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(AlertNotification::Updated)
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
                    .name("idx_alert_notification_org_id")
                    .table(AlertNotification::Table)
                    .col(AlertNotification::OrgId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AlertNotification::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Alert::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Dashboard::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DataSource::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DataSource {
    Table,
    Id,
    OrgId,
    Uid,
    Name,
    Type,
}

#[derive(DeriveIden)]
enum Dashboard {
    Table,
    Id,
    OrgId,
    Uid,
    Title,
    FolderId,
    IsFolder,
    Data,
    Created,
    Updated,
}

#[derive(DeriveIden)]
enum Alert {
    Table,
    Id,
    Version,
    DashboardId,
    PanelId,
    OrgId,
    Name,
    Message,
    State,
    Settings,
    Frequency,
    For,
    Created,
    Updated,
}

#[derive(DeriveIden)]
enum AlertNotification {
    Table,
    Id,
    OrgId,
    Uid,
    Name,
    Type,
    Settings,
    SecureSettings,
    IsDefault,
    DisableResolveMessage,
    Created,
    Updated,
}
