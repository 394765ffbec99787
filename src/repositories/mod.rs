//! # Repository Layer
//!
//! SeaORM access to the legacy alerting tables the upgrade reads and the unified alerting
//! tables it writes. Repositories borrow any [`sea_orm::ConnectionTrait`], so the upgrade
//! can run them inside one transaction.

pub mod legacy;
pub mod unified;

pub use legacy::LegacyAlertingRepository;
pub use unified::UnifiedAlertingRepository;
