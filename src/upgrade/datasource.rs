//! Datasource lookup from legacy numeric ids to stable uids.

use std::collections::HashMap;

use crate::models::data_source;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasourceRef {
    pub uid: String,
    pub kind: String,
}

/// (org id, datasource id) → [`DatasourceRef`], plus a reverse index by uid.
///
/// Lookups are best effort: legacy alerts can point at datasources that were deleted since.
#[derive(Debug, Clone, Default)]
pub struct DatasourceResolver {
    by_id: HashMap<(i64, i64), DatasourceRef>,
    kind_by_uid: HashMap<(i64, String), String>,
}

impl DatasourceResolver {
    pub fn from_models(models: impl IntoIterator<Item = data_source::Model>) -> Self {
        let mut resolver = Self::default();
        for model in models {
            resolver.insert(model.org_id, model.id, model.uid, model.kind);
        }
        resolver
    }

    pub fn insert(&mut self, org_id: i64, id: i64, uid: impl Into<String>, kind: impl Into<String>) {
        let reference = DatasourceRef {
            uid: uid.into(),
            kind: kind.into(),
        };
        self.kind_by_uid
            .insert((org_id, reference.uid.clone()), reference.kind.clone());
        self.by_id.insert((org_id, id), reference);
    }

    pub fn get(&self, org_id: i64, id: i64) -> Option<&DatasourceRef> {
        self.by_id.get(&(org_id, id))
    }

    /// Stable uid for a legacy id, empty when the datasource is unknown.
    pub fn uid(&self, org_id: i64, id: i64) -> &str {
        self.get(org_id, id).map(|r| r.uid.as_str()).unwrap_or("")
    }

    pub fn kind_by_uid(&self, org_id: i64, uid: &str) -> Option<&str> {
        if uid.is_empty() {
            return None;
        }
        self.kind_by_uid
            .get(&(org_id, uid.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
