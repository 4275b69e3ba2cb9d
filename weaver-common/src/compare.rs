// ABOUTME: compares a candidate json document against a target shape or json schema.
// ABOUTME: every failure is reported as a string verdict so callers never see a parse error escape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const VALID_STRUCTURE: &str = "Valid structure";
pub const VALID_JSON: &str = "Valid JSON";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum, schemars::JsonSchema,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ComparatorMode {
    /// Diff the top-level key names of an example document.
    #[default]
    KeySet,
    /// Validate against the target interpreted as a JSON Schema.
    Schema,
}

impl ComparatorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparatorMode::KeySet => "key_set",
            ComparatorMode::Schema => "schema",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

pub fn compare_structure(candidate: &str, target: &str, mode: ComparatorMode) -> String {
    match mode {
        ComparatorMode::KeySet => compare_key_set(candidate, target),
        ComparatorMode::Schema => compare_schema(candidate, target),
    }
}

/// Shallow diff of top-level keys. Missing keys are reported before extra keys.
pub fn compare_key_set(candidate: &str, target: &str) -> String {
    let target: Value = match serde_json::from_str(target) {
        Ok(v) => v,
        Err(err) => return format!("Validation error: {err}"),
    };
    let candidate: Value = match serde_json::from_str(candidate) {
        Ok(v) => v,
        Err(err) => return format!("Validation error: {err}"),
    };

    let target_keys = match own_keys(&target) {
        Ok(keys) => keys,
        Err(message) => return format!("Validation error: {message}"),
    };
    let candidate_keys = match own_keys(&candidate) {
        Ok(keys) => keys,
        Err(message) => return format!("Validation error: {message}"),
    };

    let missing: Vec<&str> = target_keys
        .iter()
        .filter(|k| !candidate_keys.contains(*k))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return format!("Missing keys: {}", missing.join(", "));
    }

    let extra: Vec<&str> = candidate_keys
        .iter()
        .filter(|k| !target_keys.contains(*k))
        .map(String::as_str)
        .collect();
    if !extra.is_empty() {
        return format!("Extra keys: {}", extra.join(", "));
    }

    VALID_STRUCTURE.to_string()
}

pub fn compare_schema(candidate: &str, schema: &str) -> String {
    let schema: Value = match serde_json::from_str(schema) {
        Ok(v) => v,
        Err(err) => return format!("Failed to validate JSON: {err}"),
    };
    let instance: Value = match serde_json::from_str(candidate) {
        Ok(v) => v,
        Err(err) => return format!("Failed to validate JSON: {err}"),
    };

    let validator = match jsonschema::validator_for(&schema) {
        Ok(v) => v,
        Err(err) => return format!("Failed to validate JSON: {err}"),
    };

    let violations: Vec<SchemaViolation> = validator
        .iter_errors(&instance)
        .map(|err| SchemaViolation {
            path: err.instance_path.to_string(),
            message: err.to_string(),
        })
        .collect();

    if violations.is_empty() {
        return VALID_JSON.to_string();
    }

    match serde_json::to_string(&violations) {
        Ok(s) => s,
        Err(err) => format!("Failed to validate JSON: {err}"),
    }
}

/// Own enumerable keys in property order: array indices first in ascending
/// order, then the remaining keys as written. Arrays and strings expose their
/// indices (strings counted in utf-16 units), other scalars have no keys.
fn own_keys(value: &Value) -> Result<Vec<String>, &'static str> {
    match value {
        Value::Null => Err("Cannot convert undefined or null to object"),
        Value::Bool(_) | Value::Number(_) => Ok(Vec::new()),
        Value::String(s) => Ok((0..s.encode_utf16().count()).map(|i| i.to_string()).collect()),
        Value::Array(items) => Ok((0..items.len()).map(|i| i.to_string()).collect()),
        Value::Object(map) => {
            let mut indices: Vec<(u32, &str)> = Vec::new();
            let mut named: Vec<&str> = Vec::new();
            for key in map.keys() {
                match array_index(key) {
                    Some(idx) => indices.push((idx, key.as_str())),
                    None => named.push(key.as_str()),
                }
            }
            indices.sort_by_key(|(idx, _)| *idx);
            Ok(indices
                .into_iter()
                .map(|(_, k)| k)
                .chain(named)
                .map(str::to_string)
                .collect())
        }
    }
}

// Canonical decimal below 2^32 - 1, no sign and no leading zeros.
fn array_index(key: &str) -> Option<u32> {
    let idx: u32 = key.parse().ok()?;
    (idx != u32::MAX && idx.to_string() == key).then_some(idx)
}
