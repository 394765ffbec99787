//! Inlining of nested Graphite query references.
//!
//! Graphite panel targets may reference sibling targets through `#<refID>` placeholders.
//! Once a query is detached from its panel those references dangle, so they are replaced
//! by the referenced target text before the rule is stored.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

pub const GRAPHITE_TYPE: &str = "graphite";
const TARGET_FIELD: &str = "target";
const TARGET_FULL_FIELD: &str = "targetFull";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphiteError {
    #[error("panel {panel_id} not found in dashboard")]
    PanelNotFound { panel_id: i64 },
    #[error("no target with refId '{ref_id}' in panel {panel_id}")]
    RefIdNotFound { ref_id: String, panel_id: i64 },
    #[error("circular reference while resolving refId '{ref_id}'")]
    CircularReference { ref_id: String },
}

/// Counters for the Graphite repair pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphiteStats {
    /// Queries whose expanded target was copied over
    pub expanded_copied: usize,
    /// Queries whose placeholders were resolved from the panel
    pub unwrapped: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwrapOutcome {
    Unchanged,
    ExpandedCopied,
    Unwrapped,
}

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([A-Z]+)").expect("valid regex"));

pub fn has_placeholders(target: &str) -> bool {
    PLACEHOLDER_RE.is_match(target)
}

/// Rewrites `model` so its `target` carries no `#<refID>` references.
///
/// `panel_tree` is the dashboard JSON the alert came from and `ref_id` the refID the query
/// had inside its panel. On error the model is left untouched.
pub fn unwrap_query(
    model: &mut Map<String, JsonValue>,
    panel_tree: &JsonValue,
    panel_id: i64,
    ref_id: &str,
) -> Result<UnwrapOutcome, GraphiteError> {
    if let Some(JsonValue::String(full)) = model.get(TARGET_FULL_FIELD)
        && !has_placeholders(full)
    {
        let full = JsonValue::String(full.clone());
        model.insert(TARGET_FIELD.to_string(), full);
        model.remove(TARGET_FULL_FIELD);
        return Ok(UnwrapOutcome::ExpandedCopied);
    }

    let needs_unwrap = model
        .get(TARGET_FIELD)
        .and_then(JsonValue::as_str)
        .is_some_and(has_placeholders);
    if !needs_unwrap {
        return Ok(UnwrapOutcome::Unchanged);
    }

    let panel = find_panel(panel_tree, panel_id).ok_or(GraphiteError::PanelNotFound { panel_id })?;
    let targets = panel_targets(panel);
    if !targets.contains_key(ref_id) {
        return Err(GraphiteError::RefIdNotFound {
            ref_id: ref_id.to_string(),
            panel_id,
        });
    }

    let mut resolving = HashSet::new();
    let resolved = resolve_target(ref_id, &targets, panel_id, &mut resolving)?;
    model.insert(TARGET_FIELD.to_string(), JsonValue::String(resolved));
    model.remove(TARGET_FULL_FIELD);
    Ok(UnwrapOutcome::Unwrapped)
}

/// Depth-first search for a panel by id, descending into collapsed rows and legacy `rows`.
pub fn find_panel(dashboard: &JsonValue, panel_id: i64) -> Option<&JsonValue> {
    let mut stack: Vec<&JsonValue> = Vec::new();
    for key in ["panels", "rows"] {
        if let Some(children) = dashboard.get(key).and_then(JsonValue::as_array) {
            stack.extend(children.iter().rev());
        }
    }
    while let Some(node) = stack.pop() {
        if node.get("id").and_then(JsonValue::as_i64) == Some(panel_id) {
            return Some(node);
        }
        if let Some(children) = node.get("panels").and_then(JsonValue::as_array) {
            stack.extend(children.iter().rev());
        }
    }
    None
}

fn panel_targets(panel: &JsonValue) -> HashMap<String, String> {
    panel
        .get("targets")
        .and_then(JsonValue::as_array)
        .map(|targets| {
            targets
                .iter()
                .filter_map(|t| {
                    let ref_id = t.get("refId")?.as_str()?;
                    let target = t.get(TARGET_FIELD)?.as_str()?;
                    Some((ref_id.to_string(), target.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Expands every placeholder of `ref_id`'s target. `resolving` holds the refIDs on the
/// current path; re-entering one is a cycle.
pub fn resolve_target(
    ref_id: &str,
    targets: &HashMap<String, String>,
    panel_id: i64,
    resolving: &mut HashSet<String>,
) -> Result<String, GraphiteError> {
    if !resolving.insert(ref_id.to_string()) {
        return Err(GraphiteError::CircularReference {
            ref_id: ref_id.to_string(),
        });
    }
    let target = targets.get(ref_id).ok_or_else(|| GraphiteError::RefIdNotFound {
        ref_id: ref_id.to_string(),
        panel_id,
    })?;

    let mut resolved = String::with_capacity(target.len());
    let mut last = 0;
    for caps in PLACEHOLDER_RE.captures_iter(target) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        resolved.push_str(&target[last..whole.start()]);
        resolved.push_str(&resolve_target(name.as_str(), targets, panel_id, resolving)?);
        last = whole.end();
    }
    resolved.push_str(&target[last..]);

    resolving.remove(ref_id);
    Ok(resolved)
}
