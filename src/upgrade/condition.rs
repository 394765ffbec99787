//! Translation of legacy classic conditions into a query graph.
//!
//! Each legacy condition points at a panel query through `[refID, from, to]`. The output
//! holds one data query per distinct (refID, time range) and a single `classic_conditions`
//! expression that combines them, referenced by [`Condition::condition`].

use std::collections::BTreeMap;

use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;

use super::datasource::DatasourceResolver;
use super::duration::{self, DurationParseError};
use super::settings::{ConditionEvaluator, ConditionType, DashAlertCondition};

/// Datasource uid of server side expressions.
pub const EXPRESSION_DATASOURCE_UID: &str = "__expr__";
pub const DEFAULT_MAX_DATA_POINTS: i64 = 1500;
pub const DEFAULT_INTERVAL_MS: i64 = 1000;
const EXPRESSION_MAX_DATA_POINTS: i64 = 43200;
const RANDOM_REF_ID_ATTEMPTS: usize = 20;

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("unexpected number of query parameters in condition {index}: want 3, got {got}")]
    UnexpectedQueryParams { index: usize, got: usize },
    #[error("invalid time range in condition {index}: {source}")]
    InvalidTimeRange {
        index: usize,
        #[source]
        source: DurationParseError,
    },
    #[error("query model of refID '{ref_id}' is not a JSON object")]
    InvalidQueryModel { ref_id: String },
    #[error("failed to allocate a unique refID")]
    RefIdExhausted,
}

/// Query window relative to evaluation time, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeTimeRange {
    pub from: i64,
    pub to: i64,
}

/// One data query or expression in a rule's evaluation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertQuery {
    pub ref_id: String,
    #[serde(default)]
    pub query_type: String,
    pub relative_time_range: RelativeTimeRange,
    pub datasource_uid: String,
    pub model: JsonValue,
}

impl AlertQuery {
    pub fn is_expression(&self) -> bool {
        self.datasource_uid == EXPRESSION_DATASOURCE_UID
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// RefID of the expression deciding the alert state
    pub condition: String,
    pub org_id: i64,
    /// Sorted by refID
    pub data: Vec<AlertQuery>,
    /// New refID → refID the query had in its panel
    pub source_ref_ids: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct ClassicConditionJson<'a> {
    evaluator: &'a ConditionEvaluator,
    operator: &'a ConditionType,
    query: ClassicConditionQuery,
    reducer: &'a ConditionType,
}

#[derive(Serialize)]
struct ClassicConditionQuery {
    params: Vec<String>,
}

/// Translates the conditions of one legacy alert.
pub fn translate(
    conditions: &[DashAlertCondition],
    org_id: i64,
    datasources: &DatasourceResolver,
) -> Result<Condition, ConditionError> {
    translate_with(conditions, org_id, datasources, generate_short_uid)
}

/// Same as [`translate`] with an injectable generator for fallback refIDs.
pub fn translate_with(
    conditions: &[DashAlertCondition],
    org_id: i64,
    datasources: &DatasourceResolver,
    mut random_ref_id: impl FnMut() -> String,
) -> Result<Condition, ConditionError> {
    // (from, to) per condition, in condition order.
    let mut ranges = Vec::with_capacity(conditions.len());
    for (i, cond) in conditions.iter().enumerate() {
        let [_, from, to] = cond.query.params.as_slice() else {
            return Err(ConditionError::UnexpectedQueryParams {
                index: i + 1,
                got: cond.query.params.len(),
            });
        };
        ranges.push((from.clone(), to.clone()));
    }

    let mut by_ref_id: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, cond) in conditions.iter().enumerate() {
        by_ref_id.entry(cond.query.params[0].as_str()).or_default().push(i);
    }

    // New refID → indexes of the conditions it serves.
    let mut new_ref_ids: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut split: Vec<BTreeMap<(String, String), Vec<usize>>> = Vec::new();
    for (ref_id, idxs) in &by_ref_id {
        let mut per_range: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
        for &i in idxs {
            per_range.entry(ranges[i].clone()).or_default().push(i);
        }
        if per_range.len() == 1 {
            new_ref_ids.insert((*ref_id).to_string(), idxs.clone());
        } else {
            split.push(per_range);
        }
    }
    // Kept refIDs are reserved before any fresh ones are handed out.
    for per_range in split {
        for (_, idxs) in per_range {
            let fresh = allocate_ref_id(&new_ref_ids, &mut random_ref_id)?;
            new_ref_ids.insert(fresh, idxs);
        }
    }

    let mut cond_ref_ids = vec![String::new(); conditions.len()];
    let mut source_ref_ids = BTreeMap::new();
    let mut data = Vec::with_capacity(new_ref_ids.len() + 1);
    for (ref_id, idxs) in &new_ref_ids {
        for &i in idxs {
            cond_ref_ids[i].clone_from(ref_id);
        }
        let first = idxs[0];
        let cond = &conditions[first];
        source_ref_ids.insert(ref_id.clone(), cond.query.params[0].clone());
        let (from, to) = &ranges[first];

        let from = duration::parse_from(from)
            .map_err(|source| ConditionError::InvalidTimeRange { index: first + 1, source })?;
        let to = duration::parse_to(to)
            .map_err(|source| ConditionError::InvalidTimeRange { index: first + 1, source })?;

        let JsonValue::Object(mut model) = cond.query.model.clone() else {
            return Err(ConditionError::InvalidQueryModel {
                ref_id: ref_id.clone(),
            });
        };
        let query_type = model
            .get("queryType")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        model.insert("refId".to_string(), json!(ref_id));
        model.insert("maxDataPoints".to_string(), json!(DEFAULT_MAX_DATA_POINTS));
        if !model.contains_key("intervalMs") {
            model.insert("intervalMs".to_string(), json!(DEFAULT_INTERVAL_MS));
        }

        data.push(AlertQuery {
            ref_id: ref_id.clone(),
            query_type,
            relative_time_range: RelativeTimeRange {
                from: duration::nanos_to_seconds(from),
                to: duration::nanos_to_seconds(to),
            },
            datasource_uid: datasources.uid(org_id, cond.query.datasource_id).to_string(),
            model: JsonValue::Object(model),
        });
    }

    let classic: Vec<ClassicConditionJson<'_>> = conditions
        .iter()
        .zip(&cond_ref_ids)
        .map(|(cond, ref_id)| ClassicConditionJson {
            evaluator: &cond.evaluator,
            operator: &cond.operator,
            query: ClassicConditionQuery {
                params: vec![ref_id.clone()],
            },
            reducer: &cond.reducer,
        })
        .collect();

    let cc_ref_id = allocate_ref_id(&new_ref_ids, &mut random_ref_id)?;
    data.push(AlertQuery {
        ref_id: cc_ref_id.clone(),
        query_type: String::new(),
        relative_time_range: RelativeTimeRange::default(),
        datasource_uid: EXPRESSION_DATASOURCE_UID.to_string(),
        model: json!({
            "type": "classic_conditions",
            "refId": cc_ref_id,
            "conditions": classic,
            "datasource": {"type": EXPRESSION_DATASOURCE_UID, "uid": EXPRESSION_DATASOURCE_UID},
            "intervalMs": DEFAULT_INTERVAL_MS,
            "maxDataPoints": EXPRESSION_MAX_DATA_POINTS,
        }),
    });

    data.sort_by(|a, b| a.ref_id.cmp(&b.ref_id));

    Ok(Condition {
        condition: cc_ref_id,
        org_id,
        data,
        source_ref_ids,
    })
}

/// First free letter A-Z, then a bounded number of random short ids.
fn allocate_ref_id<V>(
    used: &BTreeMap<String, V>,
    random_ref_id: &mut impl FnMut() -> String,
) -> Result<String, ConditionError> {
    for letter in b'A'..=b'Z' {
        let candidate = char::from(letter).to_string();
        if !used.contains_key(&candidate) {
            return Ok(candidate);
        }
    }
    for _ in 0..RANDOM_REF_ID_ATTEMPTS {
        let candidate = random_ref_id();
        if !candidate.is_empty() && !used.contains_key(&candidate) {
            return Ok(candidate);
        }
    }
    Err(ConditionError::RefIdExhausted)
}

/// Short random alphanumeric identifier, also used for rule uids.
pub fn generate_short_uid() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect()
}
