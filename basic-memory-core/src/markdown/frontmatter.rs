//! YAML frontmatter split/join helpers.
//!
//! The supported YAML subset is scalar strings, ISO-8601 dates/times,
//! booleans, numbers, and lists of those. Nested maps are allowed but passed
//! through as opaque JSON.

use crate::error::{Error, Result};
use serde_yaml::{Mapping, Value};

/// Split leading `---`-delimited frontmatter from content.
///
/// Absent frontmatter yields an empty mapping and the content untouched.
/// A frontmatter block that never terminates, or that holds malformed YAML,
/// is a parse error.
pub fn parse_frontmatter(content: &str) -> Result<(Mapping, &str)> {
    let Some(rest) = content.strip_prefix("---\n") else {
        return Ok((Mapping::new(), content));
    };

    let (yaml, body) = if let Some(idx) = rest.find("\n---\n") {
        (&rest[..idx + 1], &rest[idx + 5..])
    } else if let Some(yaml) = rest.strip_suffix("\n---") {
        (yaml, "")
    } else {
        return Err(Error::parse("", "unterminated frontmatter block"));
    };

    let value: Value = serde_yaml::from_str(yaml)
        .map_err(|e| Error::parse("", format!("invalid YAML in frontmatter: {e}")))?;

    let mapping = match value {
        Value::Mapping(mapping) => mapping,
        Value::Null => Mapping::new(),
        _ => return Err(Error::parse("", "frontmatter must be a mapping")),
    };

    Ok((mapping, body.trim_start_matches('\n')))
}

/// Prepend a YAML frontmatter block to content.
pub fn add_frontmatter(content: &str, mapping: &Mapping) -> Result<String> {
    let yaml = serde_yaml::to_string(mapping)
        .map_err(|e| Error::parse("", format!("failed to serialize frontmatter: {e}")))?;
    Ok(format!("---\n{yaml}---\n\n{content}"))
}

/// Convert a frontmatter YAML value into the JSON shape stored in
/// `entity_metadata`. Non-string mapping keys are stringified.
pub(crate) fn yaml_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_json::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                serde_json::Value::from(u)
            } else {
                n.as_f64().map(serde_json::Value::from).unwrap_or(serde_json::Value::Null)
            }
        }
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Sequence(seq) => serde_json::Value::Array(seq.iter().map(yaml_to_json).collect()),
        Value::Mapping(mapping) => {
            let mut object = serde_json::Map::new();
            for (key, value) in mapping {
                object.insert(yaml_key_to_string(key), yaml_to_json(value));
            }
            serde_json::Value::Object(object)
        }
        Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

/// Stringify a YAML mapping key.
pub(crate) fn yaml_key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_no_frontmatter() {
        let (mapping, body) = parse_frontmatter("# Title\n\nbody").unwrap();
        assert!(mapping.is_empty());
        assert_eq!(body, "# Title\n\nbody");
    }

    #[test]
    fn test_parse_basic_frontmatter() {
        let content = "---\ntitle: Alpha\ntype: note\n---\n\n# Alpha\n";
        let (mapping, body) = parse_frontmatter(content).unwrap();
        assert_eq!(
            mapping.get(Value::String("title".into())),
            Some(&Value::String("Alpha".into()))
        );
        assert_eq!(body, "# Alpha\n");
    }

    #[test]
    fn test_parse_empty_frontmatter() {
        let (mapping, body) = parse_frontmatter("---\n---\nbody").unwrap();
        assert!(mapping.is_empty());
        assert_eq!(body, "body");
    }

    #[test]
    fn test_parse_unterminated_frontmatter() {
        assert!(parse_frontmatter("---\ntitle: Alpha\n").is_err());
    }

    #[test]
    fn test_parse_malformed_yaml() {
        assert!(parse_frontmatter("---\ntitle: [unclosed\n---\nbody").is_err());
    }

    #[test]
    fn test_add_frontmatter_round_trip() {
        let mut mapping = Mapping::new();
        mapping.insert(Value::String("title".into()), Value::String("Alpha".into()));
        mapping.insert(Value::String("count".into()), Value::Number(3.into()));

        let serialized = add_frontmatter("# Alpha\n", &mapping).unwrap();
        let (parsed, body) = parse_frontmatter(&serialized).unwrap();

        assert_eq!(parsed, mapping);
        assert_eq!(body, "# Alpha\n");
    }

    #[test]
    fn test_yaml_to_json_nested() {
        let value: Value = serde_yaml::from_str("a:\n  b: [1, two, true]\n").unwrap();
        let json = yaml_to_json(&value);
        assert_eq!(json, serde_json::json!({"a": {"b": [1, "two", true]}}));
    }
}
