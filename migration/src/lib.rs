//! Database migrations for the alerting upgrade.
//!
//! Creates the legacy dashboard alerting tables the upgrade reads from, the unified
//! alerting tables it writes to, and the ledger recording that the upgrade ran.

pub use sea_orm_migration::prelude::*;

mod m2025_01_06_000001_create_legacy_alerting;
mod m2025_01_06_000002_create_unified_alerting;
mod m2025_01_06_000003_create_migration_log;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_06_000001_create_legacy_alerting::Migration),
            Box::new(m2025_01_06_000002_create_unified_alerting::Migration),
            Box::new(m2025_01_06_000003_create_migration_log::Migration),
        ]
    }
}
