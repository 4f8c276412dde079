//! Entity markdown writer.
//!
//! Re-emits an [`EntityDoc`] as frontmatter plus body. Observations and
//! relations already live in the body text, so serialization is a
//! frontmatter rebuild; the `format_*` helpers are for composing new
//! structured lines programmatically.

use crate::error::Result;
use crate::markdown::frontmatter::add_frontmatter;
use crate::markdown::parser::{EntityDoc, Frontmatter};
use crate::types::{ObservationDraft, RelationDraft};
use serde_yaml::{Mapping, Value};

/// Format an observation as a structured bullet line.
pub fn format_observation(obs: &ObservationDraft) -> String {
    let mut line = format!("- [{}] {}", obs.category, obs.content);
    for tag in &obs.tags {
        line.push_str(" #");
        line.push_str(tag);
    }
    if let Some(context) = &obs.context {
        line.push_str(&format!(" ({context})"));
    }
    line
}

/// Format a relation as a structured bullet line.
pub fn format_relation(rel: &RelationDraft) -> String {
    let mut line = format!("- {} [[{}]]", rel.relation_type, rel.to_name);
    if let Some(context) = &rel.context {
        line.push_str(&format!(" ({context})"));
    }
    line
}

/// Serialize a document back to markdown text.
pub fn to_markdown(doc: &EntityDoc) -> Result<String> {
    let mapping = frontmatter_mapping(&doc.frontmatter);
    if mapping.is_empty() {
        return Ok(doc.body.clone());
    }
    add_frontmatter(&doc.body, &mapping)
}

fn frontmatter_mapping(fm: &Frontmatter) -> Mapping {
    let mut mapping = Mapping::new();

    if let Some(title) = &fm.title {
        mapping.insert(Value::String("title".into()), Value::String(title.clone()));
    }
    if let Some(entity_type) = &fm.entity_type {
        mapping.insert(Value::String("type".into()), Value::String(entity_type.clone()));
    }
    if let Some(permalink) = &fm.permalink {
        mapping.insert(Value::String("permalink".into()), Value::String(permalink.clone()));
    }
    if let Some(created) = &fm.created {
        mapping.insert(Value::String("created".into()), Value::String(created.to_rfc3339()));
    }
    if let Some(modified) = &fm.modified {
        mapping.insert(Value::String("modified".into()), Value::String(modified.to_rfc3339()));
    }
    if !fm.tags.is_empty() {
        let tags = fm.tags.iter().map(|t| Value::String(t.clone())).collect();
        mapping.insert(Value::String("tags".into()), Value::Sequence(tags));
    }
    for (key, value) in &fm.metadata {
        if let Ok(yaml) = serde_yaml::to_value(value) {
            mapping.insert(Value::String(key.clone()), yaml);
        }
    }

    mapping
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::parser::EntityParser;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_observation() {
        let obs = ObservationDraft {
            category: "tech".to_string(),
            content: "uses SQLite".to_string(),
            tags: vec!["store".to_string()],
            context: Some("derived index".to_string()),
        };
        assert_eq!(format_observation(&obs), "- [tech] uses SQLite #store (derived index)");
    }

    #[test]
    fn test_format_relation() {
        let rel = RelationDraft {
            relation_type: "depends_on".to_string(),
            to_name: "Beta".to_string(),
            context: None,
        };
        assert_eq!(format_relation(&rel), "- depends_on [[Beta]]");
    }

    #[test]
    fn test_round_trip() {
        let content = "---\ntitle: Alpha\ntype: note\ntags:\n- a\n- b\nstatus: active\n---\n\n# Alpha\n\n- [tech] uses SQLite #store (derived index)\n- depends_on [[Beta]] (startup order)\n";
        let parser = EntityParser::new();

        let doc = parser.parse_str(content).unwrap();
        let serialized = to_markdown(&doc).unwrap();
        let reparsed = parser.parse_str(&serialized).unwrap();

        assert_eq!(reparsed, doc);
    }

    #[test]
    fn test_round_trip_without_frontmatter() {
        let content = "# Alpha\n\n- depends_on [[Beta]]\n";
        let parser = EntityParser::new();

        let doc = parser.parse_str(content).unwrap();
        let serialized = to_markdown(&doc).unwrap();

        assert_eq!(serialized, content);
        assert_eq!(parser.parse_str(&serialized).unwrap(), doc);
    }

    #[test]
    fn test_formatted_lines_parse_back() {
        let obs = ObservationDraft {
            category: "design".to_string(),
            content: "two pass sync".to_string(),
            tags: vec![],
            context: None,
        };
        let body = format!("# Doc\n\n{}\n", format_observation(&obs));
        let doc = EntityParser::new().parse_str(&body).unwrap();
        assert_eq!(doc.observations, vec![obs]);
    }
}
