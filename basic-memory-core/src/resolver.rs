//! Link resolution: free-form `[[link text]]` to a canonical permalink.
//!
//! Resolution order:
//! 1. exact permalink match (case-insensitive)
//! 2. exact title match
//! 3. search fallback restricted to entities, best candidate by score
//! 4. a permalink synthesized from the link text; no entity is created
//!
//! The resolver is read-only and side-effect-free. A miss is never an
//! error: the caller keeps the relation unresolved.

use crate::db::{EntityStore, SharedStore};
use crate::permalink::permalink_from_path;
use crate::search::{SearchBackend, SearchItemType, SearchQuery, SearchResult, SharedSearch};

pub struct LinkResolver {
    store: SharedStore,
    search: SharedSearch,
}

impl LinkResolver {
    pub fn new(store: SharedStore, search: SharedSearch) -> Self {
        Self { store, search }
    }

    /// Resolve link text to a permalink.
    ///
    /// Always produces a permalink; when nothing matches, it is synthesized
    /// from the link text and may not reference any existing entity.
    pub fn resolve_link(&self, link_text: &str) -> String {
        let (clean_text, _alias) = normalize_link_text(link_text);
        tracing::debug!(link = %clean_text, "Resolving link");

        match self.try_resolve(&clean_text) {
            Ok(Some(permalink)) => permalink,
            Ok(None) => permalink_from_path(&format!("{clean_text}.md")),
            Err(e) => {
                tracing::warn!(link = %clean_text, error = %e, "Link resolution failed");
                permalink_from_path(&format!("{clean_text}.md"))
            }
        }
    }

    fn try_resolve(&self, clean_text: &str) -> crate::error::Result<Option<String>> {
        if let Some(entity) = self.store.find_by_permalink(clean_text)? {
            return Ok(Some(entity.permalink));
        }

        if let Some(entity) = self.store.find_by_title(clean_text)? {
            return Ok(Some(entity.permalink));
        }

        let mut query = SearchQuery::text(clean_text);
        query.types = Some(vec![SearchItemType::Entity]);
        let results = match self.search.search(&query) {
            Ok(results) => results,
            // An unsearchable link text (e.g. only punctuation) is a miss
            Err(_) => return Ok(None),
        };

        if results.is_empty() {
            return Ok(None);
        }
        Ok(Some(select_best_match(clean_text, &results)))
    }
}

/// Strip enclosing `[[ ]]`, split an Obsidian-style `target|alias`, trim.
fn normalize_link_text(link_text: &str) -> (String, Option<String>) {
    let mut text = link_text.trim();

    if let Some(stripped) = text.strip_prefix("[[").and_then(|t| t.strip_suffix("]]")) {
        text = stripped;
    }

    match text.split_once('|') {
        Some((target, alias)) => (target.trim().to_string(), Some(alias.trim().to_string())),
        None => (text.trim().to_string(), None),
    }
}

/// Pick the best candidate from search results.
///
/// Starts from the search rank (lower is better), halves the score for each
/// query term present in the last path segment, and applies a 0.2 factor
/// when the last segment equals the query exactly.
fn select_best_match(search_text: &str, results: &[SearchResult]) -> String {
    let needle = search_text.to_lowercase();
    let terms: Vec<&str> = needle.split_whitespace().collect();

    let mut best: Option<(f64, &str)> = None;
    for result in results {
        let mut score = result.score;

        let permalink = result.permalink.to_lowercase();
        let last_segment = permalink.rsplit('/').next().unwrap_or("");

        for term in &terms {
            if last_segment.contains(term) {
                score *= 0.5;
            }
        }
        if last_segment == needle {
            score *= 0.2;
        }

        match best {
            Some((best_score, _)) if best_score <= score => {}
            _ => best = Some((score, result.permalink.as_str())),
        }
    }

    best.map(|(_, permalink)| permalink.to_string()).unwrap_or_default()
}
