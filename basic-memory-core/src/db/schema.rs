//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: entity graph + FTS5 search index
    r#"
    CREATE TABLE IF NOT EXISTS entity (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id      INTEGER NOT NULL,
        title           TEXT NOT NULL,
        entity_type     TEXT NOT NULL DEFAULT 'note',
        content_type    TEXT NOT NULL DEFAULT 'text/markdown',
        permalink       TEXT NOT NULL COLLATE NOCASE,
        file_path       TEXT NOT NULL,
        -- NULL while a sync for this file is in flight
        checksum        TEXT,
        entity_metadata JSON NOT NULL DEFAULT '{}',
        created_at      DATETIME NOT NULL,
        updated_at      DATETIME NOT NULL,

        UNIQUE(project_id, permalink),
        UNIQUE(project_id, file_path)
    );

    CREATE TABLE IF NOT EXISTS observation (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_id   INTEGER NOT NULL REFERENCES entity(id) ON DELETE CASCADE,
        category    TEXT NOT NULL DEFAULT 'note',
        content     TEXT NOT NULL,
        tags        JSON NOT NULL DEFAULT '[]',
        context     TEXT
    );

    CREATE TABLE IF NOT EXISTS relation (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        from_id       INTEGER NOT NULL REFERENCES entity(id) ON DELETE CASCADE,
        to_id         INTEGER REFERENCES entity(id) ON DELETE SET NULL,
        -- verbatim link text, kept even after resolution for re-binding
        to_name       TEXT NOT NULL,
        relation_type TEXT NOT NULL,
        context       TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_entity_project ON entity(project_id);
    CREATE INDEX IF NOT EXISTS idx_observation_entity ON observation(entity_id);
    CREATE INDEX IF NOT EXISTS idx_relation_from ON relation(from_id);
    CREATE INDEX IF NOT EXISTS idx_relation_to ON relation(to_id);
    CREATE INDEX IF NOT EXISTS idx_relation_unresolved ON relation(to_name) WHERE to_id IS NULL;

    CREATE VIRTUAL TABLE IF NOT EXISTS search_index USING fts5(
        title,
        content_stems,
        content_snippet,
        permalink,
        file_path UNINDEXED,
        type UNINDEXED,
        entity_id UNINDEXED,
        metadata UNINDEXED,
        created_at UNINDEXED,
        updated_at UNINDEXED,
        project_id UNINDEXED,
        tokenize = "unicode61 tokenchars '/'",
        prefix = '1 2 3 4'
    );
    "#,
    // Version 2: generated columns over entity_metadata for structured filters
    r#"
    ALTER TABLE entity ADD COLUMN meta_tags TEXT
        GENERATED ALWAYS AS (json_extract(entity_metadata, '$.tags')) VIRTUAL;
    ALTER TABLE entity ADD COLUMN meta_status TEXT
        GENERATED ALWAYS AS (json_extract(entity_metadata, '$.status')) VIRTUAL;
    ALTER TABLE entity ADD COLUMN meta_type TEXT
        GENERATED ALWAYS AS (json_extract(entity_metadata, '$.type')) VIRTUAL;

    CREATE INDEX IF NOT EXISTS idx_entity_meta_status ON entity(meta_status);
    CREATE INDEX IF NOT EXISTS idx_entity_meta_type ON entity(meta_type);
    "#,
];

/// Apply any outstanding migrations.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (idx, migration) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as i32;
        if version <= current {
            continue;
        }

        tracing::info!(version, "Applying schema migration");
        conn.execute_batch(migration)?;
        conn.pragma_update(None, "user_version", version)?;
    }

    Ok(())
}
