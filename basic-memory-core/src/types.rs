//! Core domain types for basic-memory-core
//!
//! These types represent the canonical records derived from a project's
//! Markdown files.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Entity** | One Markdown file's worth of indexed knowledge |
//! | **Permalink** | Stable slug identifier for an entity within a project |
//! | **Observation** | A categorized bullet extracted from the body |
//! | **Relation** | A directed link from one entity to another, possibly unresolved |
//! | **Project** | A directory of Markdown files with its own index partition |
//!
//! The filesystem is the source of truth: entities, observations, and
//! relations are rebuilt from their file on every sync. An entity whose
//! `checksum` is `None` is mid-sync and its outgoing relations may still be
//! unresolved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Entity
// ============================================

/// An indexed knowledge file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Opaque row id, stable across renames
    pub id: i64,
    /// Project partition this entity belongs to
    pub project_id: i64,
    /// Human title
    pub title: String,
    /// Entity type (e.g. `note`, `component`)
    pub entity_type: String,
    /// MIME-ish content type, typically `text/markdown`
    pub content_type: String,
    /// Unique slug derived from the file path (or set in frontmatter)
    pub permalink: String,
    /// Path relative to the project root; source of truth for location
    pub file_path: String,
    /// SHA-256 of file contents after the last completed sync.
    /// `None` while a sync for this file is in flight.
    pub checksum: Option<String>,
    /// Frontmatter keys that are not reserved, preserved verbatim
    pub entity_metadata: serde_json::Map<String, serde_json::Value>,
    /// When the entity was first indexed (or frontmatter `created`)
    pub created_at: DateTime<Utc>,
    /// Last write; non-decreasing per entity
    pub updated_at: DateTime<Utc>,
}

/// Fields written to an entity row during Pass 1 of a sync.
///
/// A draft never carries a checksum: the store inserts/updates with
/// `checksum = NULL` and only [`set_checksum`](crate::db::EntityStore::set_checksum)
/// flips the row to sync-complete.
#[derive(Debug, Clone, Default)]
pub struct EntityDraft {
    pub title: String,
    pub entity_type: String,
    pub content_type: String,
    pub permalink: String,
    pub file_path: String,
    pub entity_metadata: serde_json::Map<String, serde_json::Value>,
    /// Frontmatter `created`, if present
    pub created_at: Option<DateTime<Utc>>,
    /// Frontmatter `modified`, if present
    pub modified_at: Option<DateTime<Utc>>,
}

// ============================================
// Observation
// ============================================

/// Closed set of observation categories. Unknown categories normalize to
/// [`ObservationCategory::Note`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationCategory {
    Tech,
    Design,
    Feature,
    Note,
    Issue,
}

impl ObservationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationCategory::Tech => "tech",
            ObservationCategory::Design => "design",
            ObservationCategory::Feature => "feature",
            ObservationCategory::Note => "note",
            ObservationCategory::Issue => "issue",
        }
    }

    /// Parse a raw category string, falling back to `note` for anything
    /// outside the closed set.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "tech" => ObservationCategory::Tech,
            "design" => ObservationCategory::Design,
            "feature" => ObservationCategory::Feature,
            "note" => ObservationCategory::Note,
            "issue" => ObservationCategory::Issue,
            _ => ObservationCategory::Note,
        }
    }
}

impl std::fmt::Display for ObservationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A categorized bullet extracted from an entity body.
///
/// Observations are owned by their entity and rebuilt from the file on each
/// sync; they are never edited independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: i64,
    pub entity_id: i64,
    pub category: ObservationCategory,
    pub content: String,
    pub tags: Vec<String>,
    pub context: Option<String>,
}

/// An observation as extracted by the markdown parser, before category
/// normalization and storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationDraft {
    /// Raw category text from the `[...]` brackets
    pub category: String,
    pub content: String,
    pub tags: Vec<String>,
    pub context: Option<String>,
}

// ============================================
// Relation
// ============================================

/// A directed edge between entities.
///
/// `to_id` is `None` while the target is unknown; `to_name` always preserves
/// the verbatim link text so the edge can be rewired once the target appears.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub id: i64,
    pub from_id: i64,
    pub to_id: Option<i64>,
    pub to_name: String,
    pub relation_type: String,
    pub context: Option<String>,
}

impl Relation {
    /// Whether the target of this relation has been resolved to an entity.
    pub fn is_resolved(&self) -> bool {
        self.to_id.is_some()
    }
}

/// A relation as extracted by the markdown parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDraft {
    pub relation_type: String,
    /// Verbatim link text between the `[[ ]]` brackets
    pub to_name: String,
    pub context: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_raw() {
        assert_eq!(ObservationCategory::from_raw("tech"), ObservationCategory::Tech);
        assert_eq!(ObservationCategory::from_raw("  Design "), ObservationCategory::Design);
        assert_eq!(ObservationCategory::from_raw("banana"), ObservationCategory::Note);
        assert_eq!(ObservationCategory::from_raw(""), ObservationCategory::Note);
    }

    #[test]
    fn test_relation_is_resolved() {
        let rel = Relation {
            id: 1,
            from_id: 1,
            to_id: None,
            to_name: "Beta".to_string(),
            relation_type: "depends_on".to_string(),
            context: None,
        };
        assert!(!rel.is_resolved());
    }
}
