//! Test utilities for database testing.
//!
//! In-memory SQLite databases with every migration applied, plus builders inserting
//! legacy alerting fixtures.

#![allow(dead_code)]

use alerting_upgrade::crypto::SecretKey;
use alerting_upgrade::models::{alert_notification, dashboard, data_source, legacy_alert};
use anyhow::Result;
use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use serde_json::{Value as JsonValue, json};

pub const TEST_KEY_BYTES: [u8; 32] = [42u8; 32];

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn test_key() -> SecretKey {
    SecretKey::new(TEST_KEY_BYTES.to_vec()).expect("valid test key")
}

pub async fn insert_datasource(
    db: &DatabaseConnection,
    org_id: i64,
    uid: &str,
    kind: &str,
) -> Result<data_source::Model> {
    let model = data_source::ActiveModel {
        org_id: Set(org_id),
        uid: Set(uid.to_string()),
        name: Set(format!("{kind} {uid}")),
        kind: Set(kind.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(model)
}

pub async fn insert_folder(
    db: &DatabaseConnection,
    org_id: i64,
    uid: &str,
    title: &str,
) -> Result<dashboard::Model> {
    insert_dashboard_row(db, org_id, uid, title, 0, true, json!({"title": title})).await
}

pub async fn insert_dashboard(
    db: &DatabaseConnection,
    org_id: i64,
    uid: &str,
    folder_id: i64,
    data: JsonValue,
) -> Result<dashboard::Model> {
    insert_dashboard_row(db, org_id, uid, uid, folder_id, false, data).await
}

async fn insert_dashboard_row(
    db: &DatabaseConnection,
    org_id: i64,
    uid: &str,
    title: &str,
    folder_id: i64,
    is_folder: bool,
    data: JsonValue,
) -> Result<dashboard::Model> {
    let now = Utc::now();
    let model = dashboard::ActiveModel {
        org_id: Set(org_id),
        uid: Set(uid.to_string()),
        title: Set(title.to_string()),
        folder_id: Set(folder_id),
        is_folder: Set(is_folder),
        data: Set(data),
        created: Set(now.into()),
        updated: Set(now.into()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(model)
}

/// Settings blob with one `[A, 5m, now]` condition against `datasource_id`.
pub fn alert_settings(datasource_id: i64, notifications: JsonValue) -> JsonValue {
    json!({
        "noDataState": "no_data",
        "executionErrorState": "alerting",
        "conditions": [{
            "evaluator": {"params": [80], "type": "gt"},
            "operator": {"type": "and"},
            "query": {
                "params": ["A", "5m", "now"],
                "datasourceId": datasource_id,
                "model": {"refId": "A", "expr": "cpu_usage", "hide": false}
            },
            "reducer": {"params": [], "type": "avg"},
            "type": "query"
        }],
        "notifications": notifications
    })
}

pub struct AlertFixture<'a> {
    pub org_id: i64,
    pub dashboard_id: i64,
    pub panel_id: i64,
    pub name: &'a str,
    pub message: &'a str,
    pub state: &'a str,
    pub settings: JsonValue,
}

impl<'a> AlertFixture<'a> {
    pub fn new(org_id: i64, dashboard_id: i64, name: &'a str, settings: JsonValue) -> Self {
        Self {
            org_id,
            dashboard_id,
            panel_id: 1,
            name,
            message: "",
            state: "ok",
            settings,
        }
    }

    pub async fn insert(self, db: &DatabaseConnection) -> Result<legacy_alert::Model> {
        let now = Utc::now();
        let model = legacy_alert::ActiveModel {
            version: Set(0),
            dashboard_id: Set(self.dashboard_id),
            panel_id: Set(self.panel_id),
            org_id: Set(self.org_id),
            name: Set(self.name.to_string()),
            message: Set(self.message.to_string()),
            state: Set(self.state.to_string()),
            settings: Set(self.settings),
            frequency: Set(60),
            for_duration: Set(0),
            created: Set(now.into()),
            updated: Set(now.into()),
            ..Default::default()
        }
        .insert(db)
        .await?;
        Ok(model)
    }
}

pub async fn insert_channel(
    db: &DatabaseConnection,
    org_id: i64,
    uid: &str,
    name: &str,
    kind: &str,
    is_default: bool,
    settings: JsonValue,
) -> Result<alert_notification::Model> {
    let now = Utc::now();
    let model = alert_notification::ActiveModel {
        org_id: Set(org_id),
        uid: Set(uid.to_string()),
        name: Set(name.to_string()),
        kind: Set(kind.to_string()),
        settings: Set(settings),
        secure_settings: Set(None),
        is_default: Set(is_default),
        disable_resolve_message: Set(false),
        created: Set(now.into()),
        updated: Set(now.into()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(model)
}
