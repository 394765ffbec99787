//! # Dashboard alerting upgrade
//!
//! One pass that reads every legacy dashboard alert and notification channel and writes
//! unified alert rules, their first versions, one alerting configuration document per
//! organization and a silence file for paused alerts.
//!
//! [`run_upgrade`] wraps [`migrate`] in a transaction guarded by the operator
//! acknowledgement and the migration ledger.

pub mod amconfig;
pub mod channel;
pub mod condition;
pub mod datasource;
pub mod duration;
pub mod graphite;
pub mod rule;
pub mod settings;
pub mod silence;
pub mod template;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use chrono::Utc;
use metrics::counter;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, RouteStrategy};
use crate::crypto::SecretKey;
use crate::db;
use crate::error::{MigrationError, is_unique_violation};
use crate::models::{alert_notification, dashboard};
use crate::repositories::{LegacyAlertingRepository, UnifiedAlertingRepository};

use channel::{AlertChannelLinks, ChannelOptions};
use condition::Condition;
use datasource::DatasourceResolver;
use graphite::{GRAPHITE_TYPE, GraphiteStats, UnwrapOutcome};
use rule::{BuiltRule, RulePlacement, TitleDeduplicator};
use settings::DashAlertSettings;
use silence::{SilenceBuffer, StagedSilences};

/// Ledger id of the upgrade step.
pub const MIGRATION_ID: &str = "move dashboard alerts to unified alerting";
/// Folder receiving rules of dashboards that live in the root.
pub const GENERAL_ALERTING_FOLDER: &str = "General Alerting";

#[derive(Debug, Clone)]
pub struct UpgradeOptions {
    pub silences_path: PathBuf,
    pub route_strategy: RouteStrategy,
    pub promote_first_channel_as_default: bool,
    pub secret_key: SecretKey,
}

impl UpgradeOptions {
    pub fn from_config(config: &AppConfig) -> Result<Self, MigrationError> {
        let key = config
            .secret_key
            .clone()
            .ok_or(MigrationError::MissingSecretKey)?;
        Ok(Self {
            silences_path: config.silences_path(),
            route_strategy: config.upgrade.route_strategy,
            promote_first_channel_as_default: config.upgrade.promote_first_channel_as_default,
            secret_key: SecretKey::new(key).map_err(MigrationError::SecretKey)?,
        })
    }
}

/// Counters of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationStats {
    pub orgs: u64,
    pub alerts_migrated: u64,
    /// Alerts whose dashboard no longer exists
    pub alerts_skipped: u64,
    pub rules_created: u64,
    pub silences_written: u64,
    pub receivers: u64,
    pub routes: u64,
    pub unsupported_channels: u64,
    pub unknown_channel_references: u64,
    /// Data queries whose datasource could not be resolved
    pub missing_datasources: u64,
    pub graphite: GraphiteStats,
}

/// Result of [`migrate`]: database writes done, silences staged but not yet published.
#[derive(Debug)]
pub struct StagedMigration {
    pub stats: MigrationStats,
    silences: StagedSilences,
}

impl StagedMigration {
    /// Moves the staged silence file into place. Call once the writes are committed.
    pub fn publish(self) -> Result<MigrationStats, MigrationError> {
        self.silences.publish()?;
        Ok(self.stats)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// No backup acknowledgement; nothing was touched
    NotAcknowledged,
    /// The ledger already records a successful run
    AlreadyApplied,
    Migrated(MigrationStats),
}

/// Runs the upgrade once, inside a single transaction.
pub async fn run_upgrade(
    db: &DatabaseConnection,
    config: &AppConfig,
) -> Result<UpgradeOutcome, MigrationError> {
    if !config.upgrade.backup_acknowledged {
        warn!("backup not acknowledged, skipping the alerting upgrade");
        return Ok(UpgradeOutcome::NotAcknowledged);
    }
    let options = UpgradeOptions::from_config(config)?;

    let txn = db.begin().await?;
    if db::migration_applied(&txn, MIGRATION_ID).await? {
        info!(migration_id = MIGRATION_ID, "alerting upgrade already applied");
        txn.rollback().await?;
        return Ok(UpgradeOutcome::AlreadyApplied);
    }

    // Dropping the transaction on error rolls it back; dropping the staged
    // migration discards its silence file.
    let staged = migrate(&txn, &options).await?;
    db::record_migration(&txn, MIGRATION_ID, true, "").await?;
    txn.commit().await?;
    let stats = staged.publish().inspect_err(|e| {
        error!(error = %e, "upgrade committed but the silence file could not be published");
    })?;

    info!(
        orgs = stats.orgs,
        alerts_migrated = stats.alerts_migrated,
        alerts_skipped = stats.alerts_skipped,
        silences = stats.silences_written,
        "alerting upgrade committed"
    );
    Ok(UpgradeOutcome::Migrated(stats))
}

/// Migrates every legacy alert and channel through `conn` and stages the silence file.
pub async fn migrate<C: ConnectionTrait>(
    conn: &C,
    options: &UpgradeOptions,
) -> Result<StagedMigration, MigrationError> {
    let legacy = LegacyAlertingRepository::new(conn);
    let unified = UnifiedAlertingRepository::new(conn);
    let mut stats = MigrationStats::default();
    let now = Utc::now();

    match legacy.count_alerts().await {
        Ok(count) => info!(alerts = count, "starting alerting upgrade"),
        Err(e) => warn!(error = %e, "failed to count legacy alerts"),
    }

    let datasources = DatasourceResolver::from_models(legacy.list_datasources().await?);
    let dashboards = legacy.list_dashboards().await?;
    let dashboards_by_id: HashMap<i64, &dashboard::Model> =
        dashboards.iter().map(|d| (d.id, d)).collect();
    let mut general_folders: HashMap<i64, String> = HashMap::new();

    let mut titles = TitleDeduplicator::default();
    let mut rule_uids: HashSet<String> = HashSet::new();
    let mut silences = SilenceBuffer::default();
    let mut links: BTreeMap<i64, Vec<AlertChannelLinks>> = BTreeMap::new();
    let mut built_rules: Vec<BuiltRule> = Vec::new();

    for alert in legacy.list_alerts().await? {
        let Some(dashboard) = dashboards_by_id.get(&alert.dashboard_id).copied() else {
            warn!(
                alert_id = alert.id,
                dashboard_id = alert.dashboard_id,
                "skipping alert of a missing dashboard"
            );
            stats.alerts_skipped += 1;
            continue;
        };

        let settings = DashAlertSettings::parse(&alert.settings)
            .map_err(|e| MigrationError::alert(alert.id, &alert.name, e))?;

        let folder = dashboard_folder(dashboard, &dashboards_by_id);
        let namespace_uid = match folder {
            Some(folder) => folder.uid.clone(),
            None => general_alerting_folder(&legacy, &mut general_folders, alert.org_id).await?,
        };

        let mut condition = condition::translate(&settings.conditions, alert.org_id, &datasources)
            .map_err(|e| MigrationError::alert(alert.id, &alert.name, e))?;
        stats.missing_datasources += condition
            .data
            .iter()
            .filter(|q| !q.is_expression() && q.datasource_uid.is_empty())
            .count() as u64;
        repair_graphite(
            &mut condition,
            &datasources,
            dashboard,
            alert.panel_id,
            &mut stats.graphite,
        );

        let title = titles.deduplicate(alert.org_id, &namespace_uid, &alert.name);
        let placement = RulePlacement {
            uid: unique_rule_uid(&mut rule_uids),
            title,
            namespace_uid,
            dashboard_uid: dashboard.uid.clone(),
        };
        let built = rule::build_rule(&alert, &settings, condition, placement, now)
            .map_err(|e| MigrationError::alert(alert.id, &alert.name, e))?;

        debug!(
            alert_id = alert.id,
            rule_uid = %built.rule.uid,
            title = %built.rule.title,
            "translated legacy alert"
        );
        if built.paused {
            silences.add_for_rule(&built.rule.uid, now);
        }
        links.entry(alert.org_id).or_default().push(AlertChannelLinks {
            rule_uid: built.rule.uid.clone(),
            notifications: settings.notifications,
        });
        built_rules.push(built);
        stats.alerts_migrated += 1;
    }

    for built in &built_rules {
        unified.insert_rule(&built.rule).await.map_err(|source| {
            if is_unique_violation(&source) {
                MigrationError::DuplicateRule {
                    org_id: built.rule.org_id,
                    title: built.rule.title.clone(),
                    source,
                }
            } else {
                MigrationError::Database(source)
            }
        })?;
        unified.insert_rule_version(&built.version).await?;
        stats.rules_created += 1;
    }

    let channels = legacy.list_channels().await?;
    let mut channels_by_org: BTreeMap<i64, Vec<alert_notification::Model>> = BTreeMap::new();
    for channel in channels {
        channels_by_org.entry(channel.org_id).or_default().push(channel);
    }
    let orgs: BTreeSet<i64> = links.keys().chain(channels_by_org.keys()).copied().collect();

    let channel_options = ChannelOptions {
        strategy: options.route_strategy,
        promote_first_default: options.promote_first_channel_as_default,
        key: &options.secret_key,
    };
    for org_id in orgs {
        let org_channels = channels_by_org.get(&org_id).map(Vec::as_slice).unwrap_or(&[]);
        let org_links = links.get(&org_id).map(Vec::as_slice).unwrap_or(&[]);
        let migrated = channel::migrate_org_channels(org_id, org_channels, org_links, channel_options)
            .map_err(|source| MigrationError::Channels { org_id, source })?;

        let document = serde_json::to_string(&migrated.config)
            .map_err(|source| MigrationError::Serialization { org_id, source })?;
        unified.insert_configuration(org_id, document, now).await?;

        let org_stats = migrated.stats;
        stats.orgs += 1;
        stats.receivers += org_stats.receivers as u64;
        stats.routes += org_stats.routes as u64;
        stats.unsupported_channels += org_stats.unsupported_channels as u64;
        stats.unknown_channel_references += org_stats.unknown_references as u64;
        info!(
            org_id,
            receivers = org_stats.receivers,
            routes = org_stats.routes,
            "migrated notification channels"
        );
    }

    let silences = silences.stage(&options.silences_path)?;
    stats.silences_written = silences.len() as u64;

    if stats.graphite.failures > 0 {
        warn!(
            failures = stats.graphite.failures,
            "some graphite queries kept unresolved references"
        );
    }
    record_metrics(&stats);
    Ok(StagedMigration { stats, silences })
}

/// Folder containing a dashboard, `None` for the root or a folder that no longer exists.
fn dashboard_folder<'a>(
    dashboard: &dashboard::Model,
    dashboards_by_id: &HashMap<i64, &'a dashboard::Model>,
) -> Option<&'a dashboard::Model> {
    if dashboard.folder_id == 0 {
        return None;
    }
    dashboards_by_id
        .get(&dashboard.folder_id)
        .copied()
        .filter(|folder| folder.is_folder)
}

async fn general_alerting_folder<C: ConnectionTrait>(
    legacy: &LegacyAlertingRepository<'_, C>,
    cache: &mut HashMap<i64, String>,
    org_id: i64,
) -> Result<String, MigrationError> {
    if let Some(uid) = cache.get(&org_id) {
        return Ok(uid.clone());
    }
    let uid = match legacy.find_folder_by_title(org_id, GENERAL_ALERTING_FOLDER).await? {
        Some(folder) => folder.uid,
        None => {
            let folder = legacy
                .create_folder(org_id, &condition::generate_short_uid(), GENERAL_ALERTING_FOLDER)
                .await?;
            info!(org_id, folder_uid = %folder.uid, "created folder for root dashboard alerts");
            folder.uid
        }
    };
    cache.insert(org_id, uid.clone());
    Ok(uid)
}

fn unique_rule_uid(used: &mut HashSet<String>) -> String {
    loop {
        let uid = condition::generate_short_uid();
        if used.insert(uid.clone()) {
            return uid;
        }
    }
}

/// Inlines graphite sub-query references. Failures leave the query as it was.
fn repair_graphite(
    condition: &mut Condition,
    datasources: &DatasourceResolver,
    dashboard: &dashboard::Model,
    panel_id: i64,
    stats: &mut GraphiteStats,
) {
    for query in condition.data.iter_mut() {
        if query.is_expression()
            || datasources.kind_by_uid(condition.org_id, &query.datasource_uid) != Some(GRAPHITE_TYPE)
        {
            continue;
        }
        let source_ref_id = condition
            .source_ref_ids
            .get(&query.ref_id)
            .map(String::as_str)
            .unwrap_or(query.ref_id.as_str());
        let JsonValue::Object(model) = &mut query.model else {
            continue;
        };
        match graphite::unwrap_query(model, &dashboard.data, panel_id, source_ref_id) {
            Ok(UnwrapOutcome::Unchanged) => {}
            Ok(UnwrapOutcome::ExpandedCopied) => stats.expanded_copied += 1,
            Ok(UnwrapOutcome::Unwrapped) => stats.unwrapped += 1,
            Err(e) => {
                stats.failures += 1;
                warn!(
                    dashboard_uid = %dashboard.uid,
                    panel_id,
                    ref_id = %source_ref_id,
                    error = %e,
                    "failed to unwrap graphite query"
                );
            }
        }
    }
}

fn record_metrics(stats: &MigrationStats) {
    counter!("alerting_upgrade_alerts_migrated_total").increment(stats.alerts_migrated);
    counter!("alerting_upgrade_alerts_skipped_total").increment(stats.alerts_skipped);
    counter!("alerting_upgrade_silences_total").increment(stats.silences_written);
    counter!("alerting_upgrade_unsupported_channels_total").increment(stats.unsupported_channels);
    counter!("alerting_upgrade_graphite_unwrapped_total")
        .increment((stats.graphite.unwrapped + stats.graphite.expanded_copied) as u64);
    counter!("alerting_upgrade_graphite_failures_total").increment(stats.graphite.failures as u64);
}
