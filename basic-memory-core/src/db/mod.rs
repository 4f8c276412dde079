//! Database storage layer.
//!
//! A [`Database`] wraps a single SQLite connection (WAL mode, foreign keys
//! on) shared by the store and the search index so their writes serialize
//! with each other. The [`EntityStore`] trait is the narrow capability
//! interface the synchronizer, resolver, and context builder compose;
//! [`SqliteStore`] is the shipped implementation.

pub mod schema;

mod repo;

pub use repo::SqliteStore;

use crate::error::{Error, Result};
use crate::types::{Entity, EntityDraft, Observation, ObservationDraft, Relation, RelationDraft};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared database handle.
///
/// Cloning is cheap; all clones serialize on the same connection, which
/// keeps the one-writer scheduling model trivially true.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            ",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a database from an embedder-supplied URL.
    ///
    /// Accepts a bare filesystem path, a `sqlite://` URL, or `:memory:`.
    /// Other schemes (e.g. Postgres) are not available in this build.
    pub fn from_url(url: &str) -> Result<Self> {
        if url == ":memory:" || url == "sqlite::memory:" {
            return Self::open_in_memory();
        }
        if let Some(path) = url.strip_prefix("sqlite://") {
            return Self::open(Path::new(path));
        }
        if url.contains("://") {
            return Err(Error::Fatal(format!(
                "unsupported database url scheme: {url}"
            )));
        }
        Self::open(Path::new(url))
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection();
        schema::run_migrations(&conn)
    }

    /// Get the underlying connection
    pub(crate) fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}

/// Capability interface over the canonical entity/observation/relation
/// records of one project.
///
/// Every operation is atomic on its own; callers compose them without
/// nesting transactions. Only [`EntityStore::set_checksum`] may give an
/// entity a non-NULL checksum.
pub trait EntityStore: Send + Sync {
    /// Project partition this store operates on.
    fn project_id(&self) -> i64;

    /// Insert a new entity with `checksum = NULL`. Fails with
    /// [`Error::Conflict`] when the permalink is already taken.
    fn create_entity(&self, draft: &EntityDraft) -> Result<Entity>;

    /// Update title/type/metadata/permalink of an existing entity and reset
    /// its checksum to NULL (sync incomplete).
    fn update_entity_fields(&self, entity_id: i64, draft: &EntityDraft) -> Result<Entity>;

    fn get_entity(&self, entity_id: i64) -> Result<Option<Entity>>;

    /// Case-insensitive exact permalink lookup.
    fn find_by_permalink(&self, permalink: &str) -> Result<Option<Entity>>;

    /// Case-insensitive exact title lookup.
    fn find_by_title(&self, title: &str) -> Result<Option<Entity>>;

    fn find_by_file_path(&self, file_path: &str) -> Result<Option<Entity>>;

    /// All entities whose permalink starts with the given prefix.
    fn find_by_permalink_prefix(&self, prefix: &str) -> Result<Vec<Entity>>;

    fn list_entities(&self) -> Result<Vec<Entity>>;

    /// `file_path -> checksum` for entities whose sync completed
    /// (checksum non-NULL).
    fn list_checksums(&self) -> Result<HashMap<String, String>>;

    /// Atomically delete and re-insert the observations of an entity.
    fn replace_observations(&self, entity_id: i64, observations: &[ObservationDraft]) -> Result<()>;

    /// Atomically delete and re-insert the outgoing relations of an entity,
    /// all unresolved (`to_id = NULL`). Duplicate `(target, type)` pairs
    /// collapse to the first occurrence.
    fn replace_relations(&self, entity_id: i64, relations: &[RelationDraft]) -> Result<()>;

    /// Flip an entity to sync-complete.
    fn set_checksum(&self, entity_id: i64, checksum: &str) -> Result<()>;

    /// Delete the entity at a file path, cascading observations and
    /// outgoing relations; incoming relations become unresolved.
    fn delete_entity_by_file(&self, file_path: &str) -> Result<bool>;

    /// Move an entity to a new path/permalink without touching its content.
    fn update_file_path(&self, entity_id: i64, file_path: &str, permalink: &str) -> Result<()>;

    fn observations(&self, entity_id: i64) -> Result<Vec<Observation>>;

    fn outgoing_relations(&self, entity_id: i64) -> Result<Vec<Relation>>;

    fn incoming_relations(&self, entity_id: i64) -> Result<Vec<Relation>>;

    /// Set the target of a previously unresolved relation.
    fn resolve_relation(&self, relation_id: i64, to_id: i64) -> Result<()>;

    /// All unresolved relations in the project, for late binding.
    fn find_unresolved_relations(&self) -> Result<Vec<Relation>>;
}

/// Shared handle type used across the engine's components.
pub type SharedStore = Arc<dyn EntityStore>;
