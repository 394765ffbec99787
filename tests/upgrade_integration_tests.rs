//! End-to-end tests of the alerting upgrade against an in-memory database.

use std::path::Path;

use alerting_upgrade::config::{AppConfig, RouteStrategy, UpgradeConfig};
use alerting_upgrade::db;
use alerting_upgrade::error::MigrationError;
use alerting_upgrade::models::{AlertRule, MigrationLog, dashboard};
use alerting_upgrade::repositories::{LegacyAlertingRepository, UnifiedAlertingRepository};
use alerting_upgrade::upgrade::amconfig::UserConfig;
use alerting_upgrade::upgrade::channel::{DEFAULT_RECEIVER_NAME, bundled_receiver_name};
use alerting_upgrade::upgrade::silence::decode_silences;
use alerting_upgrade::upgrade::{
    self, GENERAL_ALERTING_FOLDER, MIGRATION_ID, UpgradeOptions, UpgradeOutcome,
};
use anyhow::Result;
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, TransactionTrait};
use serde_json::json;
use tempfile::TempDir;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::*;

fn options(data_dir: &Path, route_strategy: RouteStrategy) -> UpgradeOptions {
    UpgradeOptions {
        silences_path: data_dir.join("alerting").join("silences"),
        route_strategy,
        promote_first_channel_as_default: false,
        secret_key: test_key(),
    }
}

fn app_config(data_dir: &Path, acknowledged: bool) -> AppConfig {
    AppConfig {
        data_path: data_dir.to_path_buf(),
        secret_key: Some(TEST_KEY_BYTES.to_vec()),
        upgrade: UpgradeConfig {
            backup_acknowledged: acknowledged,
            ..UpgradeConfig::default()
        },
        ..AppConfig::default()
    }
}

async fn load_config(db: &DatabaseConnection, org_id: i64) -> Result<UserConfig> {
    let row = UnifiedAlertingRepository::new(db)
        .find_configuration(org_id)
        .await?
        .expect("configuration stored");
    assert_eq!(row.configuration_version, "v1");
    assert!(!row.is_default);
    Ok(serde_json::from_str(&row.alertmanager_configuration)?)
}

/// One org with a folder dashboard, four channels and four alerts.
async fn seed_org(db: &DatabaseConnection) -> Result<dashboard::Model> {
    let prometheus = insert_datasource(db, 1, "prom", "prometheus").await?;
    let folder = insert_folder(db, 1, "ops-folder", "Ops").await?;
    let dash = insert_dashboard(db, 1, "ops-dash", folder.id, json!({"panels": []})).await?;

    insert_channel(db, 1, "email-default", "Ops email", "email", true, json!({"addresses": "ops@example.com"})).await?;
    insert_channel(db, 1, "slack-1", "Slack", "slack", false, json!({"url": "https://hooks.example/x"})).await?;
    insert_channel(db, 1, "hook-1", "Webhook", "webhook", false, json!({"url": "https://example.com/hook"})).await?;
    insert_channel(db, 1, "hipchat-1", "Hipchat", "hipchat", false, json!({})).await?;

    let both = json!([{"uid": "slack-1"}, {"uid": "hook-1"}, {"uid": "hipchat-1"}]);
    AlertFixture::new(1, dash.id, "CPU", alert_settings(prometheus.id, both)).insert(db).await?;
    let reversed = json!([{"uid": "hook-1"}, {"uid": "slack-1"}]);
    AlertFixture::new(1, dash.id, "Memory", alert_settings(prometheus.id, reversed)).insert(db).await?;
    let default_only = json!([{"uid": "email-default"}]);
    AlertFixture::new(1, dash.id, "Disk", alert_settings(prometheus.id, default_only)).insert(db).await?;
    let mut paused = AlertFixture::new(1, dash.id, "Paused", alert_settings(prometheus.id, json!([])));
    paused.state = "paused";
    paused.message = "${instance} is down";
    paused.insert(db).await?;

    Ok(folder)
}

#[tokio::test]
async fn migrates_rules_receivers_and_silences() -> Result<()> {
    let db = setup_test_db().await?;
    let data_dir = TempDir::new()?;
    let folder = seed_org(&db).await?;

    let staged = upgrade::migrate(&db, &options(data_dir.path(), RouteStrategy::Bundled)).await?;
    assert_eq!(staged.stats.silences_written, 1);
    assert!(!data_dir.path().join("alerting/silences").exists());
    let stats = staged.publish()?;
    assert_eq!(stats.alerts_migrated, 4);
    assert_eq!(stats.rules_created, 4);
    assert_eq!(stats.orgs, 1);
    assert_eq!(stats.silences_written, 1);
    assert_eq!(stats.unsupported_channels, 1);
    assert_eq!(stats.unknown_channel_references, 0);
    assert_eq!(stats.missing_datasources, 0);

    let rules = UnifiedAlertingRepository::new(&db).list_rules(1).await?;
    assert_eq!(rules.len(), 4);
    for rule in &rules {
        assert_eq!(rule.namespace_uid, folder.uid);
        assert_eq!(rule.version, 1);
        assert_eq!(rule.interval_seconds, 60);
        assert_eq!(rule.labels["rule_uid"], rule.uid.as_str());
        assert_eq!(rule.annotations["__dashboardUid__"], "ops-dash");
        let data = rule.data.as_array().expect("query list");
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["datasourceUid"], "prom");
        assert!(data[0]["model"].get("hide").is_none());
        assert_eq!(data[1]["model"]["type"], "classic_conditions");
    }
    let paused = rules.iter().find(|r| r.title == "Paused").expect("paused rule");
    assert!(
        paused.annotations["message"]
            .as_str()
            .unwrap()
            .ends_with("{{$labels.instance}} is down")
    );
    assert_eq!(AlertRule::find().count(&db).await?, 4);

    let config = load_config(&db, 1).await?;
    let bundle = bundled_receiver_name(["slack-1", "hook-1"]);
    let names: Vec<&str> = config
        .alertmanager_config
        .receivers
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(names, vec![DEFAULT_RECEIVER_NAME, bundle.as_str()]);
    let default = config.receiver(DEFAULT_RECEIVER_NAME).unwrap();
    assert_eq!(default.grafana_managed_receiver_configs.len(), 1);
    assert_eq!(default.grafana_managed_receiver_configs[0].uid, "email-default");

    let root = &config.alertmanager_config.route;
    assert_eq!(root.receiver, DEFAULT_RECEIVER_NAME);
    assert_eq!(root.routes.len(), 2);
    let cpu = rules.iter().find(|r| r.title == "CPU").unwrap();
    let memory = rules.iter().find(|r| r.title == "Memory").unwrap();
    let routed: Vec<&str> = root
        .routes
        .iter()
        .map(|r| r.object_matchers[0].value())
        .collect();
    assert_eq!(routed, vec![cpu.uid.as_str(), memory.uid.as_str()]);
    assert!(root.routes.iter().all(|r| r.receiver == bundle));

    let slack = &config.receiver(&bundle).unwrap().grafana_managed_receiver_configs;
    let slack = slack.iter().find(|i| i.kind == "slack").unwrap();
    assert!(slack.settings.get("url").is_none());
    assert!(slack.secure_settings.contains_key("url"));

    let silences = decode_silences(&std::fs::read(data_dir.path().join("alerting/silences"))?)?;
    assert_eq!(silences.len(), 1);
    let silence = silences[0].silence.as_ref().unwrap();
    assert_eq!(silence.matchers[0].pattern, paused.uid);
    Ok(())
}

#[tokio::test]
async fn fan_out_strategy_nests_routes() -> Result<()> {
    let db = setup_test_db().await?;
    let data_dir = TempDir::new()?;
    seed_org(&db).await?;

    upgrade::migrate(&db, &options(data_dir.path(), RouteStrategy::FanOut))
        .await?
        .publish()?;

    let config = load_config(&db, 1).await?;
    let root = &config.alertmanager_config.route;
    assert_eq!(root.routes.len(), 2);
    for parent in &root.routes {
        assert!(parent.receiver.is_empty());
        let receivers: Vec<&str> = parent.routes.iter().map(|r| r.receiver.as_str()).collect();
        assert_eq!(receivers, vec!["Slack", "Webhook"]);
        assert!(parent.routes.iter().all(|r| r.continue_matching));
    }
    Ok(())
}

#[tokio::test]
async fn root_dashboards_go_to_general_alerting_and_titles_are_unique() -> Result<()> {
    let db = setup_test_db().await?;
    let data_dir = TempDir::new()?;
    let ds = insert_datasource(&db, 1, "prom", "prometheus").await?;
    let dash = insert_dashboard(&db, 1, "root-dash", 0, json!({"panels": []})).await?;

    AlertFixture::new(1, dash.id, "CPU", alert_settings(ds.id, json!([]))).insert(&db).await?;
    AlertFixture::new(1, dash.id, "CPU", alert_settings(ds.id, json!([]))).insert(&db).await?;
    AlertFixture::new(1, 999, "Orphan", alert_settings(ds.id, json!([]))).insert(&db).await?;

    let stats = upgrade::migrate(&db, &options(data_dir.path(), RouteStrategy::Bundled))
        .await?
        .publish()?;
    assert_eq!(stats.alerts_migrated, 2);
    assert_eq!(stats.alerts_skipped, 1);
    assert_eq!(stats.silences_written, 0);
    assert!(!data_dir.path().join("alerting/silences").exists());

    let folder = LegacyAlertingRepository::new(&db)
        .find_folder_by_title(1, GENERAL_ALERTING_FOLDER)
        .await?
        .expect("general folder created");
    let rules = UnifiedAlertingRepository::new(&db).list_rules(1).await?;
    let titles: Vec<&str> = rules.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["CPU", "CPU #2"]);
    assert!(rules.iter().all(|r| r.namespace_uid == folder.uid));
    assert!(rules.iter().all(|r| r.rule_group == "CPU"));

    let config = load_config(&db, 1).await?;
    assert!(config.alertmanager_config.route.routes.is_empty());
    Ok(())
}

#[tokio::test]
async fn graphite_references_are_inlined() -> Result<()> {
    let db = setup_test_db().await?;
    let data_dir = TempDir::new()?;
    let ds = insert_datasource(&db, 1, "graphite-uid", "graphite").await?;
    let dash = insert_dashboard(
        &db,
        1,
        "graphite-dash",
        0,
        json!({"panels": [{"id": 4, "targets": [
            {"refId": "A", "target": "servers.*.cpu"},
            {"refId": "B", "target": "sumSeries(#A)"}
        ]}]}),
    )
    .await?;

    let settings = json!({
        "conditions": [{
            "evaluator": {"params": [1], "type": "gt"},
            "operator": {"type": "and"},
            "query": {"params": ["B", "5m", "now"], "datasourceId": ds.id,
                      "model": {"refId": "B", "target": "sumSeries(#A)"}},
            "reducer": {"type": "last"}
        }]
    });
    let mut alert = AlertFixture::new(1, dash.id, "Graphite", settings);
    alert.panel_id = 4;
    alert.insert(&db).await?;

    let stats = upgrade::migrate(&db, &options(data_dir.path(), RouteStrategy::Bundled))
        .await?
        .publish()?;
    assert_eq!(stats.graphite.unwrapped, 1);
    assert_eq!(stats.graphite.failures, 0);

    let rules = UnifiedAlertingRepository::new(&db).list_rules(1).await?;
    let query = rules[0]
        .data
        .as_array()
        .unwrap()
        .iter()
        .find(|q| q["datasourceUid"] == "graphite-uid")
        .unwrap();
    assert_eq!(query["model"]["target"], "sumSeries(servers.*.cpu)");
    Ok(())
}

#[tokio::test]
async fn upgrade_requires_acknowledgement() -> Result<()> {
    let db = setup_test_db().await?;
    let data_dir = TempDir::new()?;
    seed_org(&db).await?;

    let outcome = upgrade::run_upgrade(&db, &app_config(data_dir.path(), false)).await?;
    assert_eq!(outcome, UpgradeOutcome::NotAcknowledged);
    assert_eq!(AlertRule::find().count(&db).await?, 0);
    assert!(!db::migration_applied(&db, MIGRATION_ID).await?);
    Ok(())
}

#[tokio::test]
async fn upgrade_runs_once() -> Result<()> {
    let db = setup_test_db().await?;
    let data_dir = TempDir::new()?;
    seed_org(&db).await?;
    let config = app_config(data_dir.path(), true);

    let outcome = upgrade::run_upgrade(&db, &config).await?;
    assert!(matches!(outcome, UpgradeOutcome::Migrated(stats) if stats.rules_created == 4));
    assert!(db::migration_applied(&db, MIGRATION_ID).await?);

    let outcome = upgrade::run_upgrade(&db, &config).await?;
    assert_eq!(outcome, UpgradeOutcome::AlreadyApplied);
    assert_eq!(AlertRule::find().count(&db).await?, 4);
    assert_eq!(MigrationLog::find().count(&db).await?, 1);
    Ok(())
}

#[tokio::test]
async fn fatal_alert_error_rolls_back() -> Result<()> {
    let db = setup_test_db().await?;
    let data_dir = TempDir::new()?;
    seed_org(&db).await?;
    let dash = insert_dashboard(&db, 1, "broken-dash", 0, json!({})).await?;

    let mut settings = alert_settings(1, json!([]));
    settings["conditions"][0]["query"]["params"] = json!(["A", "5x", "now"]);
    AlertFixture::new(1, dash.id, "Broken", settings).insert(&db).await?;

    let err = upgrade::run_upgrade(&db, &app_config(data_dir.path(), true))
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::Alert { ref name, .. } if name == "Broken"));
    assert!(err.to_string().starts_with("migrate alert 'Broken': "));

    assert_eq!(AlertRule::find().count(&db).await?, 0);
    assert!(!db::migration_applied(&db, MIGRATION_ID).await?);
    assert!(!data_dir.path().join("alerting/silences").exists());
    Ok(())
}

#[tokio::test]
async fn rolled_back_pass_leaves_existing_silences() -> Result<()> {
    let db = setup_test_db().await?;
    let data_dir = TempDir::new()?;
    seed_org(&db).await?;
    let store = data_dir.path().join("alerting").join("silences");
    std::fs::create_dir_all(store.parent().unwrap())?;
    std::fs::write(&store, b"previous")?;

    let txn = db.begin().await?;
    let staged = upgrade::migrate(&txn, &options(data_dir.path(), RouteStrategy::Bundled)).await?;
    assert_eq!(staged.stats.silences_written, 1);
    assert_eq!(std::fs::read(&store)?, b"previous");
    txn.rollback().await?;
    drop(staged);

    assert_eq!(std::fs::read(&store)?, b"previous");
    let entries: Vec<_> = std::fs::read_dir(store.parent().unwrap())?
        .map(|e| e.map(|e| e.file_name()))
        .collect::<Result<_, _>>()?;
    assert_eq!(entries, vec![std::ffi::OsString::from("silences")]);
    assert_eq!(AlertRule::find().count(&db).await?, 0);
    Ok(())
}
