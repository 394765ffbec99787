//! # Alerting Upgrade Library
//!
//! Moves legacy dashboard alerts and notification channels to unified alerting: alert
//! rules with explicit query graphs, receivers, a routing tree and silences for paused
//! alerts.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod telemetry;
pub mod upgrade;
pub use migration;
