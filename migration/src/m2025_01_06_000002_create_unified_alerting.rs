//! Migration to create the unified alerting tables.
//!
//! `alert_rule` holds the live rule, `alert_rule_version` its revision history and
//! `alert_configuration` one routing/receiver document per organization.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AlertRule::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertRule::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AlertRule::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(AlertRule::Title).string_len(190).not_null())
                    .col(ColumnDef::new(AlertRule::Condition).text().not_null())
                    .col(ColumnDef::new(AlertRule::Data).json_binary().not_null())
                    .col(
                        ColumnDef::new(AlertRule::Updated)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertRule::IntervalSeconds)
                            .big_integer()
                            .not_null()
                            .default(60),
                    )
                    .col(
                        ColumnDef::new(AlertRule::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(AlertRule::Uid).string_len(40).not_null())
                    .col(ColumnDef::new(AlertRule::NamespaceUid).string_len(40).not_null())
                    .col(ColumnDef::new(AlertRule::RuleGroup).string_len(190).not_null())
                    .col(ColumnDef::new(AlertRule::NoDataState).text().not_null())
                    .col(ColumnDef::new(AlertRule::ExecErrState).text().not_null())
                    .col(
                        ColumnDef::new(AlertRule::For)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(AlertRule::Annotations).json_binary().not_null())
                    .col(ColumnDef::new(AlertRule::Labels).json_binary().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_alert_rule_org_id_uid")
                    .table(AlertRule::Table)
                    .col(AlertRule::OrgId)
                    .col(AlertRule::Uid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_alert_rule_org_id_namespace_uid_title")
                    .table(AlertRule::Table)
                    .col(AlertRule::OrgId)
                    .col(AlertRule::NamespaceUid)
                    .col(AlertRule::Title)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AlertRuleVersion::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertRuleVersion::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AlertRuleVersion::RuleOrgId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertRuleVersion::RuleUid)
                            .string_len(40)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertRuleVersion::RuleNamespaceUid)
                            .string_len(40)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertRuleVersion::RuleGroup)
                            .string_len(190)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertRuleVersion::ParentVersion)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertRuleVersion::RestoredFrom)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertRuleVersion::Version)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertRuleVersion::Created)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertRuleVersion::Title)
                            .string_len(190)
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertRuleVersion::Condition).text().not_null())
                    .col(ColumnDef::new(AlertRuleVersion::Data).json_binary().not_null())
                    .col(
                        ColumnDef::new(AlertRuleVersion::IntervalSeconds)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertRuleVersion::NoDataState).text().not_null())
                    .col(ColumnDef::new(AlertRuleVersion::ExecErrState).text().not_null())
                    .col(
                        ColumnDef::new(AlertRuleVersion::For)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AlertRuleVersion::Annotations)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertRuleVersion::Labels).json_binary().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_alert_rule_version_org_uid_version")
                    .table(AlertRuleVersion::Table)
                    .col(AlertRuleVersion::RuleOrgId)
                    .col(AlertRuleVersion::RuleUid)
                    .col(AlertRuleVersion::Version)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AlertConfiguration::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertConfiguration::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AlertConfiguration::OrgId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertConfiguration::AlertmanagerConfiguration)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertConfiguration::ConfigurationVersion)
                            .string_len(3)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertConfiguration::Default)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AlertConfiguration::CreatedAt)
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
                    .name("idx_alert_configuration_org_id")
                    .table(AlertConfiguration::Table)
                    .col(AlertConfiguration::OrgId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AlertConfiguration::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AlertRuleVersion::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AlertRule::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AlertRule {
    Table,
    Id,
    OrgId,
    Title,
    Condition,
    Data,
    Updated,
    IntervalSeconds,
    Version,
    Uid,
    NamespaceUid,
    RuleGroup,
    NoDataState,
    ExecErrState,
    For,
    Annotations,
    Labels,
}

#[derive(DeriveIden)]
enum AlertRuleVersion {
    Table,
    Id,
    RuleOrgId,
    RuleUid,
    RuleNamespaceUid,
    RuleGroup,
    ParentVersion,
    RestoredFrom,
    Version,
    Created,
    Title,
    Condition,
    Data,
    IntervalSeconds,
    NoDataState,
    ExecErrState,
    For,
    Annotations,
    Labels,
}

#[derive(DeriveIden)]
enum AlertConfiguration {
    Table,
    Id,
    OrgId,
    AlertmanagerConfiguration,
    ConfigurationVersion,
    Default,
    CreatedAt,
}
