//! # Alerting Upgrade Entry Point
//!
//! Runs the dashboard alerting to unified alerting upgrade against the configured database.

use std::path::PathBuf;

use alerting_upgrade::{
    config::{ConfigLoader, RouteStrategy},
    db, telemetry,
    upgrade::{self, UpgradeOutcome},
};
use anyhow::{Context, Result};
use clap::Parser;
use migration::{Migrator, MigratorTrait};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "alerting-upgrade", about = "Migrate dashboard alerts to unified alerting")]
struct Cli {
    /// Directory holding the layered .env files
    #[arg(long)]
    env_dir: Option<PathBuf>,

    /// Data directory; silences are written to <DIR>/alerting/silences
    #[arg(long, value_name = "DIR")]
    data_path: Option<PathBuf>,

    /// Confirm that a database backup exists
    #[arg(long)]
    acknowledge_backup: bool,

    /// Receiver layout for alerts with several channels (bundled or fan_out)
    #[arg(long)]
    route_strategy: Option<RouteStrategy>,

    /// Apply pending schema migrations before upgrading
    #[arg(long)]
    apply_schema: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = match cli.env_dir {
        Some(dir) => ConfigLoader::with_base_dir(dir),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load().context("loading configuration")?;
    if let Some(path) = cli.data_path {
        config.data_path = path;
    }
    if cli.acknowledge_backup {
        config.upgrade.backup_acknowledged = true;
    }
    if let Some(strategy) = cli.route_strategy {
        config.upgrade.route_strategy = strategy;
    }
    // Overrides can turn on the acknowledgement, which makes the key mandatory.
    config.validate().context("validating configuration")?;

    telemetry::init_tracing(&config).context("initializing telemetry")?;
    if let Ok(redacted) = config.redacted_json() {
        info!(profile = %config.profile, config = %redacted, "loaded configuration");
    }

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    if cli.apply_schema {
        Migrator::up(&db, None)
            .await
            .context("applying schema migrations")?;
    }

    match upgrade::run_upgrade(&db, &config)
        .await
        .context("running alerting upgrade")?
    {
        UpgradeOutcome::NotAcknowledged => {
            println!(
                "Backup not acknowledged; set UALERT_UPGRADE_BACKUP_ACKNOWLEDGED=true or pass --acknowledge-backup."
            );
        }
        UpgradeOutcome::AlreadyApplied => {
            println!("Alerting upgrade already applied; nothing to do.");
        }
        UpgradeOutcome::Migrated(stats) => {
            println!(
                "Migrated {} alert(s) into {} rule(s) across {} organization(s); {} skipped, {} silence(s) written.",
                stats.alerts_migrated,
                stats.rules_created,
                stats.orgs,
                stats.alerts_skipped,
                stats.silences_written
            );
        }
    }

    Ok(())
}
