//! Entity markdown parser.
//!
//! Grammar for structured bullet lines anywhere in the body:
//!
//! ```text
//! - [category] content text #tag1 #tag2 (optional context)
//! - relation type [[Target Entity]] (optional context)
//! ```
//!
//! A line starting with `- [` must parse as an observation; a malformed one
//! (unclosed bracket, empty category) fails the whole file. Relation lines
//! that are missing the `[[ ]]` target are skipped silently, as is any other
//! bullet. The last balanced trailing paren group on a line is its context;
//! parens nested inside the content are preserved.

use crate::error::{Error, Result};
use crate::fileio;
use crate::markdown::frontmatter::{parse_frontmatter, yaml_key_to_string, yaml_to_json};
use crate::types::{ObservationDraft, RelationDraft};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Parsed frontmatter record. Reserved keys are lifted into fields; all
/// other keys are preserved verbatim in `metadata`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    pub title: Option<String>,
    pub entity_type: Option<String>,
    pub permalink: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Frontmatter {
    fn from_mapping(mapping: &Mapping) -> Self {
        let mut fm = Frontmatter::default();

        for (key, value) in mapping {
            match yaml_key_to_string(key).as_str() {
                "title" => fm.title = scalar_string(value),
                "type" => fm.entity_type = scalar_string(value),
                "permalink" => fm.permalink = scalar_string(value),
                "created" => fm.created = parse_datetime(value),
                "modified" => fm.modified = parse_datetime(value),
                "tags" => fm.tags = parse_tags(value),
                other => {
                    fm.metadata.insert(other.to_string(), yaml_to_json(value));
                }
            }
        }

        fm
    }
}

/// One parsed Markdown file: frontmatter, raw body, and the structured
/// lines extracted from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityDoc {
    pub frontmatter: Frontmatter,
    pub body: String,
    pub observations: Vec<ObservationDraft>,
    pub relations: Vec<RelationDraft>,
}

impl EntityDoc {
    /// Title used for the entity: frontmatter `title`, else the first
    /// `# `-level heading in the body.
    pub fn display_title(&self) -> Option<String> {
        if let Some(title) = &self.frontmatter.title {
            return Some(title.clone());
        }
        self.body
            .lines()
            .find_map(|line| line.trim().strip_prefix("# ").map(|t| t.trim().to_string()))
    }
}

/// Parser for entity markdown files.
#[derive(Debug, Default)]
pub struct EntityParser;

impl EntityParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a file from disk (UTF-8, falling back to UTF-16).
    pub fn parse_file(&self, path: &Path) -> Result<EntityDoc> {
        let content = fileio::read_markdown(path)?;
        self.parse_str(&content)
            .map_err(|e| e.with_file(&path.display().to_string()))
    }

    /// Parse raw content.
    pub fn parse_str(&self, content: &str) -> Result<EntityDoc> {
        let (mapping, body) = parse_frontmatter(content)?;
        let frontmatter = Frontmatter::from_mapping(&mapping);

        let mut observations = Vec::new();
        let mut relations = Vec::new();

        for line in body.lines() {
            let Some(rest) = line.trim().strip_prefix('-') else {
                continue;
            };
            let rest = rest.trim_start();

            if rest.starts_with('[') && !rest.starts_with("[[") {
                observations.push(parse_observation(rest)?);
            } else if rest.contains("[[") {
                if let Some(relation) = parse_relation(rest) {
                    relations.push(relation);
                }
            }
        }

        Ok(EntityDoc {
            frontmatter,
            body: body.to_string(),
            observations,
            relations,
        })
    }
}

/// Parse an observation bullet (the `- ` prefix already stripped).
fn parse_observation(rest: &str) -> Result<ObservationDraft> {
    let close = rest
        .find(']')
        .ok_or_else(|| Error::parse("", format!("unclosed category bracket: {rest}")))?;

    let category = rest[1..close].trim();
    if category.is_empty() {
        return Err(Error::parse("", format!("observation category cannot be empty: {rest}")));
    }

    let after = rest[close + 1..].trim();
    let (main, context) = split_trailing_context(after);

    let mut tags = Vec::new();
    let mut words = Vec::new();
    for word in main.split_whitespace() {
        match word.strip_prefix('#') {
            Some(tag) if !tag.is_empty() => tags.push(tag.to_string()),
            _ => words.push(word),
        }
    }

    let content = words.join(" ");
    if content.is_empty() {
        return Err(Error::parse("", format!("observation content cannot be empty: {rest}")));
    }

    Ok(ObservationDraft {
        category: category.to_string(),
        content,
        tags,
        context,
    })
}

/// Parse a relation bullet (the `- ` prefix already stripped). Lines without
/// a well-formed `[[Target]]` are not relations.
fn parse_relation(rest: &str) -> Option<RelationDraft> {
    let (main, context) = split_trailing_context(rest);

    let open = main.find("[[")?;
    let after = &main[open + 2..];
    let close = after.find("]]")?;

    let to_name = after[..close].trim();
    if to_name.is_empty() {
        return None;
    }

    // relation type is everything before the brackets, possibly multi-word
    let relation_type = main[..open].trim();
    if relation_type.is_empty() {
        return None;
    }

    Some(RelationDraft {
        relation_type: relation_type.to_string(),
        to_name: to_name.to_string(),
        context,
    })
}

/// Split the final balanced `(...)` group off the end of a line.
///
/// Returns the remaining text and the context, if any. A paren group that
/// spans the whole line, or unbalanced parens, are left in the content.
fn split_trailing_context(s: &str) -> (&str, Option<String>) {
    let trimmed = s.trim_end();
    if !trimmed.ends_with(')') {
        return (s, None);
    }

    let mut depth = 0i32;
    let mut start = None;
    for (i, c) in trimmed.char_indices().rev() {
        match c {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    start = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    match start {
        Some(i) if i > 0 => {
            let context = trimmed[i + 1..trimmed.len() - 1].trim();
            let content = trimmed[..i].trim_end();
            if context.is_empty() {
                (content, None)
            } else {
                (content, Some(context.to_string()))
            }
        }
        _ => (s, None),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_tags(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(seq) => seq
            .iter()
            .filter_map(scalar_string)
            .filter(|t| !t.is_empty())
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    let raw = scalar_string(value)?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    tracing::debug!(value = %raw, "Unparseable frontmatter timestamp");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(content: &str) -> EntityDoc {
        EntityParser::new().parse_str(content).unwrap()
    }

    #[test]
    fn test_parse_observation_line() {
        let doc = parse("- [tech] uses SQLite #store\n");
        assert_eq!(
            doc.observations,
            vec![ObservationDraft {
                category: "tech".to_string(),
                content: "uses SQLite".to_string(),
                tags: vec!["store".to_string()],
                context: None,
            }]
        );
    }

    #[test]
    fn test_parse_observation_with_context_and_tags() {
        let doc = parse("- [design] revisited twice #v2 #review (after retro)\n");
        let obs = &doc.observations[0];
        assert_eq!(obs.content, "revisited twice");
        assert_eq!(obs.tags, vec!["v2", "review"]);
        assert_eq!(obs.context.as_deref(), Some("after retro"));
    }

    #[test]
    fn test_observation_nested_parens_preserved() {
        let doc = parse("- [tech] caches f(x) results (memoization layer)\n");
        let obs = &doc.observations[0];
        assert_eq!(obs.content, "caches f(x) results");
        assert_eq!(obs.context.as_deref(), Some("memoization layer"));
    }

    #[test]
    fn test_observation_empty_category_fails() {
        let parser = EntityParser::new();
        assert!(parser.parse_str("- [ ] empty\n").is_err());
        assert!(parser.parse_str("- [unclosed content\n").is_err());
    }

    #[test]
    fn test_non_bullet_lines_skipped() {
        let doc = parse("# Heading\n\nplain prose [not] a bullet\n* other list\n");
        assert!(doc.observations.is_empty());
        assert!(doc.relations.is_empty());
    }

    #[test]
    fn test_parse_relation_line() {
        let doc = parse("- depends_on [[Beta]]\n");
        assert_eq!(
            doc.relations,
            vec![RelationDraft {
                relation_type: "depends_on".to_string(),
                to_name: "Beta".to_string(),
                context: None,
            }]
        );
    }

    #[test]
    fn test_parse_relation_multi_word_type() {
        let doc = parse("- is part of [[Core Engine]] (since v2)\n");
        let rel = &doc.relations[0];
        assert_eq!(rel.relation_type, "is part of");
        assert_eq!(rel.to_name, "Core Engine");
        assert_eq!(rel.context.as_deref(), Some("since v2"));
    }

    #[test]
    fn test_relation_missing_brackets_skipped() {
        let doc = parse("- depends_on Beta\n- depends_on [[Beta\n- [[Beta]]\n");
        assert!(doc.relations.is_empty());
    }

    #[test]
    fn test_parse_full_document() {
        let content = "---\ntitle: Alpha\ntype: component\npermalink: notes/alpha\ntags: [a, b]\nstatus: active\n---\n\n# Alpha\n\nSome prose.\n\n- [tech] uses SQLite #store\n- depends_on [[Beta]]\n";
        let doc = parse(content);

        assert_eq!(doc.frontmatter.title.as_deref(), Some("Alpha"));
        assert_eq!(doc.frontmatter.entity_type.as_deref(), Some("component"));
        assert_eq!(doc.frontmatter.permalink.as_deref(), Some("notes/alpha"));
        assert_eq!(doc.frontmatter.tags, vec!["a", "b"]);
        assert_eq!(
            doc.frontmatter.metadata.get("status"),
            Some(&serde_json::Value::String("active".to_string()))
        );
        assert_eq!(doc.observations.len(), 1);
        assert_eq!(doc.relations.len(), 1);
        assert!(doc.body.starts_with("# Alpha"));
    }

    #[test]
    fn test_tags_accept_comma_string() {
        let doc = parse("---\ntags: \"a, b , ,c\"\n---\nbody\n");
        assert_eq!(doc.frontmatter.tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_frontmatter_dates() {
        let doc = parse("---\ncreated: 2025-01-02T10:00:00Z\nmodified: 2025-01-03\n---\nbody\n");
        assert_eq!(
            doc.frontmatter.created.unwrap().to_rfc3339(),
            "2025-01-02T10:00:00+00:00"
        );
        assert_eq!(
            doc.frontmatter.modified.unwrap().to_rfc3339(),
            "2025-01-03T00:00:00+00:00"
        );
    }

    #[test]
    fn test_display_title_falls_back_to_heading() {
        let doc = parse("# Alpha\n\nbody\n");
        assert_eq!(doc.display_title().as_deref(), Some("Alpha"));
    }
}
