//! Read access to the legacy dashboard alerting tables.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde_json::json;

use crate::models::{
    Dashboard, DataSource, LegacyAlert, AlertNotification, alert_notification, dashboard,
    data_source, legacy_alert,
};

/// Repository over the legacy tables, usable with a pool or an open transaction.
#[derive(Debug, Clone, Copy)]
pub struct LegacyAlertingRepository<'a, C> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> LegacyAlertingRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn count_alerts(&self) -> Result<u64, DbErr> {
        LegacyAlert::find().count(self.conn).await
    }

    /// All legacy alerts ordered by id
    pub async fn list_alerts(&self) -> Result<Vec<legacy_alert::Model>, DbErr> {
        LegacyAlert::find()
            .order_by_asc(legacy_alert::Column::Id)
            .all(self.conn)
            .await
    }

    pub async fn list_datasources(&self) -> Result<Vec<data_source::Model>, DbErr> {
        DataSource::find()
            .order_by_asc(data_source::Column::Id)
            .all(self.conn)
            .await
    }

    /// Dashboards and folders of every organization
    pub async fn list_dashboards(&self) -> Result<Vec<dashboard::Model>, DbErr> {
        Dashboard::find()
            .order_by_asc(dashboard::Column::Id)
            .all(self.conn)
            .await
    }

    /// Notification channels ordered by organization, then id
    pub async fn list_channels(&self) -> Result<Vec<alert_notification::Model>, DbErr> {
        AlertNotification::find()
            .order_by_asc(alert_notification::Column::OrgId)
            .order_by_asc(alert_notification::Column::Id)
            .all(self.conn)
            .await
    }

    pub async fn find_folder_by_title(
        &self,
        org_id: i64,
        title: &str,
    ) -> Result<Option<dashboard::Model>, DbErr> {
        Dashboard::find()
            .filter(dashboard::Column::OrgId.eq(org_id))
            .filter(dashboard::Column::IsFolder.eq(true))
            .filter(dashboard::Column::Title.eq(title))
            .one(self.conn)
            .await
    }

    /// Creates an empty folder in the root of an organization.
    pub async fn create_folder(
        &self,
        org_id: i64,
        uid: &str,
        title: &str,
    ) -> Result<dashboard::Model, DbErr> {
        let now = Utc::now();
        dashboard::ActiveModel {
            org_id: Set(org_id),
            uid: Set(uid.to_string()),
            title: Set(title.to_string()),
            folder_id: Set(0),
            is_folder: Set(true),
            data: Set(json!({"title": title, "uid": uid})),
            created: Set(now.into()),
            updated: Set(now.into()),
            ..Default::default()
        }
        .insert(self.conn)
        .await
    }
}
