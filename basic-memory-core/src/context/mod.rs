//! Memory-URL context building.
//!
//! Expands a memory:// address into a bounded subgraph: the entities the
//! address matches, their neighborhood up to a hop limit, and the edges
//! traversed. Readers may run concurrently with a sync; an entity whose
//! checksum is NULL is mid-sync and its relations are treated as in-flight.

mod memory_url;
mod timeframe;

pub use memory_url::MemoryUrl;
pub use timeframe::{parse_timeframe, parse_timeframe_at};

use crate::db::{EntityStore, SharedStore};
use crate::error::Result;
use crate::search::{SearchBackend, SearchItemType, SearchQuery, SharedSearch};
use crate::types::{Entity, Relation};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Default hop limit.
pub const DEFAULT_DEPTH: usize = 1;
/// Default timeframe for primary matches.
pub const DEFAULT_TIMEFRAME: &str = "7d";
/// Default cap on primary matches.
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// One traversed (or surfaced unresolved) edge.
#[derive(Debug, Clone)]
pub struct ContextEdge {
    pub from_id: i64,
    /// None for unresolved relations; `to_name` still names the target
    pub to_id: Option<i64>,
    pub to_name: String,
    pub relation_type: String,
    pub context: Option<String>,
}

impl ContextEdge {
    fn from_relation(relation: &Relation) -> Self {
        Self {
            from_id: relation.from_id,
            to_id: relation.to_id,
            to_name: relation.to_name.clone(),
            relation_type: relation.relation_type.clone(),
            context: relation.context.clone(),
        }
    }
}

/// Summary data attached to a context response.
#[derive(Debug, Clone)]
pub struct ContextMetadata {
    pub uri: String,
    pub depth: usize,
    pub timeframe: String,
    pub generated_at: DateTime<Utc>,
    pub primary_count: usize,
    pub related_count: usize,
    pub relation_count: usize,
}

/// A bounded graph of matched entities and their neighborhood.
#[derive(Debug)]
pub struct GraphContext {
    /// Entities directly matching the address
    pub primary_entities: Vec<Entity>,
    /// Entities reached via relations
    pub related_entities: Vec<Entity>,
    /// Edges traversed, including unresolved ones
    pub edges: Vec<ContextEdge>,
    pub metadata: ContextMetadata,
}

/// Expands memory:// addresses against the store and search index.
pub struct ContextBuilder {
    store: SharedStore,
    search: SharedSearch,
}

impl ContextBuilder {
    pub fn new(store: SharedStore, search: SharedSearch) -> Self {
        Self { store, search }
    }

    /// Build the context for an address with default depth, timeframe, and
    /// result cap.
    pub fn build_default(&self, url: &MemoryUrl) -> Result<GraphContext> {
        self.build(url, DEFAULT_DEPTH, DEFAULT_TIMEFRAME, DEFAULT_MAX_RESULTS)
    }

    /// Build the context for an address.
    pub fn build(
        &self,
        url: &MemoryUrl,
        depth: usize,
        timeframe: &str,
        max_results: usize,
    ) -> Result<GraphContext> {
        let since = parse_timeframe(timeframe)?;

        let mut primary = self.resolve_primary(url)?;
        primary.retain(|entity| entity.created_at >= since);
        primary.truncate(max_results);

        let mut visited: HashSet<i64> = primary.iter().map(|e| e.id).collect();
        let mut seen_edges: HashSet<i64> = HashSet::new();
        let mut frontier: Vec<i64> = primary.iter().map(|e| e.id).collect();
        let mut related: Vec<Entity> = Vec::new();
        let mut edges: Vec<ContextEdge> = Vec::new();

        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();

            for id in frontier {
                for relation in self.store.outgoing_relations(id)? {
                    if seen_edges.insert(relation.id) {
                        edges.push(ContextEdge::from_relation(&relation));
                    }
                    if let Some(to_id) = relation.to_id {
                        if visited.insert(to_id) {
                            if let Some(entity) = self.store.get_entity(to_id)? {
                                related.push(entity);
                                next.push(to_id);
                            }
                        }
                    }
                }
                for relation in self.store.incoming_relations(id)? {
                    if seen_edges.insert(relation.id) {
                        edges.push(ContextEdge::from_relation(&relation));
                    }
                    if visited.insert(relation.from_id) {
                        if let Some(entity) = self.store.get_entity(relation.from_id)? {
                            related.push(entity);
                            next.push(relation.from_id);
                        }
                    }
                }
            }

            frontier = next;
        }

        let metadata = ContextMetadata {
            uri: url.to_string(),
            depth,
            timeframe: timeframe.to_string(),
            generated_at: Utc::now(),
            primary_count: primary.len(),
            related_count: related.len(),
            relation_count: edges.len(),
        };

        Ok(GraphContext {
            primary_entities: primary,
            related_entities: related,
            edges,
            metadata,
        })
    }

    /// Resolve the address path to its primary entities: exact permalink
    /// first, then permalink prefix, then the fuzzy search fallback.
    fn resolve_primary(&self, url: &MemoryUrl) -> Result<Vec<Entity>> {
        if url.prefix {
            return self.store.find_by_permalink_prefix(url.pattern_prefix());
        }

        if let Some(entity) = self.store.find_by_permalink(&url.path)? {
            return Ok(vec![entity]);
        }

        let by_prefix = self.store.find_by_permalink_prefix(&url.path)?;
        if !by_prefix.is_empty() {
            return Ok(by_prefix);
        }

        let mut query = SearchQuery::text(url.fuzzy_text());
        query.types = Some(vec![SearchItemType::Entity]);
        let results = match self.search.search(&query) {
            Ok(results) => results,
            Err(_) => return Ok(Vec::new()),
        };

        let mut entities = Vec::new();
        for result in results {
            if let Some(id) = result.entity_id {
                if let Some(entity) = self.store.get_entity(id)? {
                    entities.push(entity);
                }
            }
        }
        Ok(entities)
    }
}
