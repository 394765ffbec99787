//! # Data Models
//!
//! SeaORM entities for the legacy dashboard alerting tables the upgrade reads and the
//! unified alerting tables it writes.

pub mod alert_configuration;
pub mod alert_notification;
pub mod alert_rule;
pub mod alert_rule_version;
pub mod dashboard;
pub mod data_source;
pub mod legacy_alert;
pub mod migration_log;

pub use alert_configuration::Entity as AlertConfiguration;
pub use alert_notification::Entity as AlertNotification;
pub use alert_rule::Entity as AlertRule;
pub use alert_rule_version::Entity as AlertRuleVersion;
pub use dashboard::Entity as Dashboard;
pub use data_source::Entity as DataSource;
pub use legacy_alert::Entity as LegacyAlert;
pub use migration_log::Entity as MigrationLog;
