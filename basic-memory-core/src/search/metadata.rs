//! Structured metadata filters for search.
//!
//! Filters address frontmatter keys stored in the `metadata` JSON column,
//! with dotted paths traversing nested maps:
//!
//! ```text
//! {"status": "in-progress"}
//! {"tags": ["security", "oauth"]}            # array contains all
//! {"priority": {"$in": ["high", "critical"]}}
//! {"schema.confidence": {"$gt": 0.7}}
//! {"schema.confidence": {"$between": [0.3, 0.6]}}
//! ```

use crate::error::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)*$").unwrap())
}

fn numeric_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap())
}

/// Comparison mode for ordering operators: numeric when both sides parse as
/// numbers, textual otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Numeric,
    Text,
}

/// The operator of a normalized filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Equality; arrays containing the value also match
    Eq,
    /// Array contains all listed values
    Contains,
    /// Value is one of the listed values
    In,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Inclusive range
    Between,
}

/// Normalized metadata filter, ready for SQL generation.
#[derive(Debug, Clone)]
pub struct MetadataFilter {
    pub path: Vec<String>,
    pub op: FilterOp,
    pub values: Vec<Value>,
    pub comparison: Comparison,
}

impl MetadataFilter {
    /// JSON path expression for `json_extract`/`json_each`.
    pub fn json_path(&self) -> String {
        let mut path = String::from("$");
        for part in &self.path {
            path.push_str(&format!(".\"{part}\""));
        }
        path
    }
}

fn is_numeric_value(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => numeric_re().is_match(s.trim()),
        _ => false,
    }
}

fn comparison_for(values: &[Value]) -> Comparison {
    if values.iter().all(is_numeric_value) {
        Comparison::Numeric
    } else {
        Comparison::Text
    }
}

/// Parse raw metadata filters into normalized clauses.
pub fn parse_metadata_filters(
    filters: &serde_json::Map<String, Value>,
) -> Result<Vec<MetadataFilter>> {
    let mut parsed = Vec::new();

    for (raw_key, raw_value) in filters {
        let key = raw_key.trim();
        if key.is_empty() || !key_re().is_match(key) {
            return Err(Error::Query(format!("unsupported metadata filter key: {raw_key}")));
        }
        let path: Vec<String> = key.split('.').map(str::to_string).collect();

        // Operator form
        if let Value::Object(object) = raw_value {
            if object.len() != 1 {
                return Err(Error::Query(format!(
                    "invalid metadata filter for '{raw_key}': expected a single operator"
                )));
            }
            let (op, value) = object.iter().next().unwrap();

            match op.as_str() {
                "$in" => {
                    let Value::Array(values) = value else {
                        return Err(Error::Query(format!("$in requires a list for '{raw_key}'")));
                    };
                    if values.is_empty() {
                        return Err(Error::Query(format!(
                            "$in requires a non-empty list for '{raw_key}'"
                        )));
                    }
                    parsed.push(MetadataFilter {
                        path,
                        op: FilterOp::In,
                        comparison: comparison_for(values),
                        values: values.clone(),
                    });
                }
                "$gt" | "$gte" | "$lt" | "$lte" => {
                    let op = match op.as_str() {
                        "$gt" => FilterOp::Gt,
                        "$gte" => FilterOp::Gte,
                        "$lt" => FilterOp::Lt,
                        _ => FilterOp::Lte,
                    };
                    parsed.push(MetadataFilter {
                        path,
                        op,
                        comparison: comparison_for(std::slice::from_ref(value)),
                        values: vec![value.clone()],
                    });
                }
                "$between" => {
                    let Value::Array(values) = value else {
                        return Err(Error::Query(format!(
                            "$between requires [min, max] for '{raw_key}'"
                        )));
                    };
                    if values.len() != 2 {
                        return Err(Error::Query(format!(
                            "$between requires [min, max] for '{raw_key}'"
                        )));
                    }
                    parsed.push(MetadataFilter {
                        path,
                        op: FilterOp::Between,
                        comparison: comparison_for(values),
                        values: values.clone(),
                    });
                }
                other => {
                    return Err(Error::Query(format!(
                        "unsupported operator '{other}' in metadata filter for '{raw_key}'"
                    )));
                }
            }
            continue;
        }

        // Array contains (all)
        if let Value::Array(values) = raw_value {
            if values.is_empty() {
                return Err(Error::Query(format!(
                    "empty list not allowed for metadata filter '{raw_key}'"
                )));
            }
            parsed.push(MetadataFilter {
                path,
                op: FilterOp::Contains,
                comparison: Comparison::Text,
                values: values.clone(),
            });
            continue;
        }

        // Simple equality
        parsed.push(MetadataFilter {
            path,
            op: FilterOp::Eq,
            comparison: Comparison::Text,
            values: vec![raw_value.clone()],
        });
    }

    Ok(parsed)
}
