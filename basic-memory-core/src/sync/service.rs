//! Two-pass synchronizer.
//!
//! Pass 1 reconciles files with the store in deterministic order
//! (deleted, moved, modified, new), writing entities with `checksum = NULL`
//! and their relations unresolved. Pass 2 resolves relation targets, rewires
//! previously unresolved relations that now have a target, flips the
//! checksum, and refreshes the search row. Pass 2 never starts until Pass 1
//! has completed for the whole batch.

use crate::config::{ProjectConfig, SyncOptions};
use crate::db::{Database, EntityStore, SharedStore, SqliteStore};
use crate::error::{Error, Result};
use crate::markdown::{EntityDoc, EntityParser};
use crate::permalink::{normalize_permalink, permalink_from_path};
use crate::resolver::LinkResolver;
use crate::search::{
    generate_variants, SearchBackend, SearchItemType, SearchRow, SharedSearch, SqliteSearchIndex,
};
use crate::sync::{find_changes, FileChangeScanner, SyncPhase, SyncReport};
use crate::types::{Entity, EntityDraft};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SNIPPET_MAX_CHARS: usize = 250;

/// A file upserted during Pass 1, pending relation resolution.
struct TouchedFile {
    entity_id: i64,
    path: String,
    checksum: String,
    doc: Option<EntityDoc>,
}

/// The sync engine for one project.
pub struct SyncService {
    root: PathBuf,
    options: SyncOptions,
    store: SharedStore,
    search: SharedSearch,
    resolver: LinkResolver,
    parser: EntityParser,
    scanner: FileChangeScanner,
}

impl SyncService {
    pub fn new(
        config: &ProjectConfig,
        options: SyncOptions,
        store: SharedStore,
        search: SharedSearch,
    ) -> Self {
        Self {
            root: config.root_path.clone(),
            options,
            resolver: LinkResolver::new(store.clone(), search.clone()),
            store,
            search,
            parser: EntityParser::new(),
            scanner: FileChangeScanner::new(&config.root_path),
        }
    }

    /// Open the database named by the config, run migrations, and build the
    /// engine with the SQLite store and search backends.
    pub fn open(config: &ProjectConfig, options: SyncOptions) -> Result<Self> {
        if !config.root_path.is_dir() {
            return Err(Error::Fatal(format!(
                "project root is not a directory: {}",
                config.root_path.display()
            )));
        }

        let db = Database::from_url(&config.database_url)?;
        db.migrate()?;

        let store: SharedStore = Arc::new(SqliteStore::new(db.clone(), config.project_id));
        let search: SharedSearch = Arc::new(SqliteSearchIndex::new(db, config.project_id));
        Ok(Self::new(config, options, store, search))
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn search(&self) -> SharedSearch {
        self.search.clone()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full sync: scan the whole tree and reconcile.
    pub fn sync(&self) -> Result<SyncReport> {
        let scan = self.scanner.scan();
        let known = self.store.list_checksums()?;
        let mut report = find_changes(scan, &known, self.options.detect_moves);
        self.apply(&mut report)?;
        Ok(report)
    }

    /// Incremental sync restricted to the given paths (watcher batches).
    /// A path that is gone by scan time is treated as a delete.
    pub fn sync_paths(&self, paths: &[PathBuf]) -> Result<SyncReport> {
        let scan = self.scanner.scan_paths(paths);
        let known_all = self.store.list_checksums()?;

        // Restrict the known set to the batch so unrelated files are not
        // reported as deleted
        let mut known = HashMap::new();
        for path in paths {
            if let Some(rel) = self.scanner.relative(path) {
                if let Some(checksum) = known_all.get(&rel) {
                    known.insert(rel, checksum.clone());
                }
            }
        }

        let mut report = find_changes(scan, &known, self.options.detect_moves);
        self.apply(&mut report)?;
        Ok(report)
    }

    /// Drop and rebuild every search row from the store. Returns the number
    /// of rows written.
    pub fn reindex_all(&self) -> Result<usize> {
        tracing::info!("Starting full reindex");
        self.search.delete_all()?;

        let entities = self.store.list_entities()?;
        let count = entities.len();
        for entity in &entities {
            self.index_entity(entity, None)?;
        }

        tracing::info!(count, "Reindex complete");
        Ok(count)
    }

    fn apply(&self, report: &mut SyncReport) -> Result<()> {
        if report.total_changes() == 0 {
            return Ok(());
        }

        let mut touched: Vec<TouchedFile> = Vec::new();
        let mut moved_ids: Vec<i64> = Vec::new();

        // Deletions first so a rename can reuse the freed permalink.
        // Deletion failure is fatal for the batch.
        for path in report.deleted.clone() {
            self.delete_file(&path)?;
        }

        // Moves update path and permalink only; content was not re-read
        let moved = std::mem::take(&mut report.moved);
        for state in &moved {
            let Some(old_path) = state.moved_from.clone() else {
                continue;
            };
            match self.store.find_by_file_path(&old_path)? {
                Some(entity) => {
                    // A path-derived permalink follows the file; an explicit
                    // frontmatter permalink stays put
                    let new_permalink =
                        if entity.permalink.eq_ignore_ascii_case(&permalink_from_path(&old_path)) {
                            permalink_from_path(&state.path)
                        } else {
                            entity.permalink.clone()
                        };
                    match self.store.update_file_path(entity.id, &state.path, &new_permalink) {
                        Ok(()) => {
                            self.search.delete_row(&entity.permalink)?;
                            moved_ids.push(entity.id);
                            tracing::info!(
                                from = %old_path,
                                to = %state.path,
                                "Moved entity"
                            );
                        }
                        Err(e) => report.record_error(&state.path, SyncPhase::Store, e.to_string()),
                    }
                }
                // The old row is gone; fall back to a plain create
                None => {
                    report.new.insert(state.path.clone());
                }
            }
        }
        report.moved = moved;

        // Modified, then new, each in sorted order
        let paths: Vec<String> = report
            .modified
            .iter()
            .chain(report.new.iter())
            .cloned()
            .collect();
        for path in paths {
            let checksum = report.checksums.get(&path).cloned().unwrap_or_default();
            match self.sync_file(&path) {
                Ok((entity_id, doc)) => touched.push(TouchedFile {
                    entity_id,
                    path,
                    checksum,
                    doc: Some(doc),
                }),
                Err(Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                    // Gone between scan and apply: a delete after all
                    self.delete_file(&path)?;
                    report.modified.remove(&path);
                    report.new.remove(&path);
                    report.deleted.insert(path);
                }
                Err(e) => {
                    let phase = match &e {
                        Error::Parse { .. } => SyncPhase::Parse,
                        Error::Conflict { .. } | Error::Database(_) => SyncPhase::Store,
                        _ => SyncPhase::Parse,
                    };
                    report.record_error(&path, phase, e.to_string());
                }
            }
        }

        // Pass 2 strictly follows Pass 1 for the whole batch
        for file in &touched {
            if let Err(e) = self.resolve_and_complete(file) {
                report.record_error(&file.path, SyncPhase::Resolve, e.to_string());
            }
        }
        for entity_id in moved_ids {
            if let Err(e) = self.complete_moved(entity_id) {
                let path = self
                    .store
                    .get_entity(entity_id)?
                    .map(|entity| entity.file_path)
                    .unwrap_or_default();
                report.record_error(path, SyncPhase::Index, e.to_string());
            }
        }

        Ok(())
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        if let Some(entity) = self.store.find_by_file_path(path)? {
            self.store.delete_entity_by_file(path)?;
            self.search.delete_row(&entity.permalink)?;
            tracing::info!(path = %path, "Deleted entity");
        }
        Ok(())
    }

    /// Pass 1 for one file: parse, upsert entity fields with NULL checksum,
    /// replace observations and (unresolved) relations.
    fn sync_file(&self, rel: &str) -> Result<(i64, EntityDoc)> {
        let abs = self.root.join(rel);
        let doc = self.parser.parse_file(&abs)?;
        let draft = entity_draft_from_doc(rel, &doc);

        let entity = match self.store.find_by_file_path(rel)? {
            Some(existing) => self.store.update_entity_fields(existing.id, &draft)?,
            None => self.store.create_entity(&draft)?,
        };

        self.store.replace_observations(entity.id, &doc.observations)?;
        self.store.replace_relations(entity.id, &doc.relations)?;

        Ok((entity.id, doc))
    }

    /// Pass 2 for one file: resolve outgoing relations, rewire unresolved
    /// relations elsewhere that name this entity, flip the checksum, refresh
    /// the search row.
    fn resolve_and_complete(&self, file: &TouchedFile) -> Result<()> {
        let Some(entity) = self.store.get_entity(file.entity_id)? else {
            return Ok(());
        };

        for relation in self.store.outgoing_relations(entity.id)? {
            if relation.to_id.is_some() {
                continue;
            }
            let permalink = self.resolver.resolve_link(&relation.to_name);
            if let Some(target) = self.store.find_by_permalink(&permalink)? {
                self.store.resolve_relation(relation.id, target.id)?;
            }
            // A miss stays unresolved and is retried when targets appear
        }

        // Late binding: this entity may be the target other files were
        // waiting for
        for relation in self.store.find_unresolved_relations()? {
            if relation.from_id == entity.id {
                continue;
            }
            if link_matches_entity(&relation.to_name, &entity) {
                self.store.resolve_relation(relation.id, entity.id)?;
            }
        }

        self.store.set_checksum(entity.id, &file.checksum)?;
        self.index_entity(&entity, file.doc.as_ref())?;
        Ok(())
    }

    fn complete_moved(&self, entity_id: i64) -> Result<()> {
        let Some(entity) = self.store.get_entity(entity_id)? else {
            return Ok(());
        };

        for relation in self.store.find_unresolved_relations()? {
            if relation.from_id != entity.id && link_matches_entity(&relation.to_name, &entity) {
                self.store.resolve_relation(relation.id, entity.id)?;
            }
        }

        self.index_entity(&entity, None)
    }

    /// Project an entity into its search row.
    fn index_entity(&self, entity: &Entity, doc: Option<&EntityDoc>) -> Result<()> {
        let mut stems: Vec<String> = Vec::new();
        stems.extend(generate_variants(&entity.title));
        stems.extend(generate_variants(&entity.permalink));
        stems.extend(generate_variants(&entity.file_path));

        let body = match doc {
            Some(doc) => doc.body.clone(),
            None => self
                .store
                .observations(entity.id)?
                .iter()
                .map(|obs| obs.content.clone())
                .collect::<Vec<_>>()
                .join("\n"),
        };
        let snippet: String = body.trim().chars().take(SNIPPET_MAX_CHARS).collect();
        stems.push(body);

        let mut metadata = entity.entity_metadata.clone();
        metadata.insert(
            "entity_type".to_string(),
            serde_json::Value::String(entity.entity_type.clone()),
        );

        self.search.index_row(&SearchRow {
            title: entity.title.clone(),
            content_stems: stems.join("\n"),
            content_snippet: snippet,
            permalink: entity.permalink.clone(),
            file_path: entity.file_path.clone(),
            item_type: SearchItemType::Entity,
            entity_id: Some(entity.id),
            metadata: serde_json::Value::Object(metadata),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

/// Whether a relation's link text names the given entity.
fn link_matches_entity(to_name: &str, entity: &Entity) -> bool {
    let candidate = to_name.trim();
    entity.permalink.eq_ignore_ascii_case(candidate)
        || entity.title.eq_ignore_ascii_case(candidate)
        || entity
            .permalink
            .eq_ignore_ascii_case(&permalink_from_path(&format!("{candidate}.md")))
}

fn entity_draft_from_doc(rel: &str, doc: &EntityDoc) -> EntityDraft {
    let title = doc.display_title().unwrap_or_else(|| file_stem(rel));
    let permalink = doc
        .frontmatter
        .permalink
        .as_deref()
        .map(normalize_permalink)
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| permalink_from_path(rel));

    let mut metadata = doc.frontmatter.metadata.clone();
    if !doc.frontmatter.tags.is_empty() {
        metadata.insert(
            "tags".to_string(),
            serde_json::Value::Array(
                doc.frontmatter
                    .tags
                    .iter()
                    .map(|t| serde_json::Value::String(t.clone()))
                    .collect(),
            ),
        );
    }

    EntityDraft {
        title,
        entity_type: doc
            .frontmatter
            .entity_type
            .clone()
            .unwrap_or_else(|| "note".to_string()),
        content_type: "text/markdown".to_string(),
        permalink,
        file_path: rel.to_string(),
        entity_metadata: metadata,
        created_at: doc.frontmatter.created,
        modified_at: doc.frontmatter.modified,
    }
}

fn file_stem(rel: &str) -> String {
    Path::new(rel)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| rel.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_draft_defaults() {
        let doc = EntityParser::new().parse_str("# Alpha\n\nbody\n").unwrap();
        let draft = entity_draft_from_doc("notes/alpha.md", &doc);

        assert_eq!(draft.title, "Alpha");
        assert_eq!(draft.entity_type, "note");
        assert_eq!(draft.permalink, "notes/alpha");
        assert_eq!(draft.file_path, "notes/alpha.md");
    }

    #[test]
    fn test_entity_draft_frontmatter_overrides() {
        let doc = EntityParser::new()
            .parse_str("---\ntitle: Custom\ntype: component\npermalink: Custom/Slug\ntags: [x]\n---\nbody\n")
            .unwrap();
        let draft = entity_draft_from_doc("notes/alpha.md", &doc);

        assert_eq!(draft.title, "Custom");
        assert_eq!(draft.entity_type, "component");
        assert_eq!(draft.permalink, "custom/slug");
        assert_eq!(
            draft.entity_metadata.get("tags"),
            Some(&serde_json::json!(["x"]))
        );
    }

    #[test]
    fn test_link_matches_entity() {
        let entity = Entity {
            id: 1,
            project_id: 1,
            title: "Beta".to_string(),
            entity_type: "note".to_string(),
            content_type: "text/markdown".to_string(),
            permalink: "notes/beta".to_string(),
            file_path: "notes/beta.md".to_string(),
            checksum: None,
            entity_metadata: Default::default(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        assert!(link_matches_entity("Beta", &entity));
        assert!(link_matches_entity("beta", &entity));
        assert!(link_matches_entity("notes/beta", &entity));
        assert!(link_matches_entity("Notes/Beta", &entity));
        assert!(!link_matches_entity("Gamma", &entity));
    }
}
