//! Full-text search over the derived index.
//!
//! The [`SearchBackend`] trait is the one contract the rest of the engine
//! sees; [`SqliteSearchIndex`] implements it over the FTS5 `search_index`
//! table. Rows are keyed by `(project_id, permalink)` and are a projection
//! of an entity for retrieval only, never the primary source.

mod metadata;
mod sqlite;

pub use metadata::{parse_metadata_filters, Comparison, FilterOp, MetadataFilter};
pub use sqlite::SqliteSearchIndex;

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// What kind of row a search hit refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchItemType {
    Entity,
    Relation,
    Observation,
}

impl SearchItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchItemType::Entity => "entity",
            SearchItemType::Relation => "relation",
            SearchItemType::Observation => "observation",
        }
    }
}

impl std::str::FromStr for SearchItemType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "entity" => Ok(SearchItemType::Entity),
            "relation" => Ok(SearchItemType::Relation),
            "observation" => Ok(SearchItemType::Observation),
            other => Err(format!("unknown search item type: {other}")),
        }
    }
}

/// A search request.
///
/// `text` is tokenized with `/` as a token character, so path prefixes like
/// `notes/al*` match. A trailing `*` on any token turns it into a prefix
/// query.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: String,
    pub types: Option<Vec<SearchItemType>>,
    pub entity_types: Option<Vec<String>>,
    pub after_date: Option<DateTime<Utc>>,
    pub metadata_filters: Option<serde_json::Map<String, serde_json::Value>>,
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// One row written into the index.
#[derive(Debug, Clone)]
pub struct SearchRow {
    pub title: String,
    pub content_stems: String,
    pub content_snippet: String,
    pub permalink: String,
    pub file_path: String,
    pub item_type: SearchItemType,
    pub entity_id: Option<i64>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One search hit. Scores ascend: lower is better.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub title: String,
    pub permalink: String,
    pub file_path: String,
    pub item_type: SearchItemType,
    pub entity_id: Option<i64>,
    pub score: f64,
    pub snippet: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Capability interface over the search index.
pub trait SearchBackend: Send + Sync {
    /// Insert or replace the row keyed by `(project_id, permalink)`.
    fn index_row(&self, row: &SearchRow) -> Result<()>;

    /// Remove the row for a permalink.
    fn delete_row(&self, permalink: &str) -> Result<()>;

    /// Remove every row of the project (for reindexing).
    fn delete_all(&self) -> Result<()>;

    /// Ranked search; ascending score is better, ties broken by
    /// `updated_at` descending.
    fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>>;
}

/// Shared handle type used across the engine's components.
pub type SharedSearch = Arc<dyn SearchBackend>;

/// Generate text variants for better partial matching.
///
/// Produces the original, lowercase form, path segments, individual words,
/// and character 3-grams, so short or partial queries still hit.
pub fn generate_variants(text: &str) -> BTreeSet<String> {
    let mut variants = BTreeSet::new();
    let text = text.trim();
    if text.is_empty() {
        return variants;
    }

    variants.insert(text.to_string());
    let lower = text.to_lowercase();

    if lower.contains('/') {
        for part in lower.split('/') {
            let part = part.trim();
            if !part.is_empty() {
                variants.insert(part.to_string());
            }
        }
    }

    for word in lower.split_whitespace() {
        variants.insert(word.to_string());
    }

    let chars: Vec<char> = lower.chars().collect();
    for window in chars.windows(3) {
        variants.insert(window.iter().collect());
    }

    variants.insert(lower);
    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_variants_path() {
        let variants = generate_variants("notes/Alpha");
        assert!(variants.contains("notes/alpha"));
        assert!(variants.contains("notes"));
        assert!(variants.contains("alpha"));
        assert!(variants.contains("alp"));
    }

    #[test]
    fn test_generate_variants_words() {
        let variants = generate_variants("Core Engine");
        assert!(variants.contains("core"));
        assert!(variants.contains("engine"));
        assert!(variants.contains("Core Engine"));
    }

    #[test]
    fn test_item_type_round_trip() {
        for t in [SearchItemType::Entity, SearchItemType::Relation, SearchItemType::Observation] {
            assert_eq!(t.as_str().parse::<SearchItemType>().unwrap(), t);
        }
    }
}
