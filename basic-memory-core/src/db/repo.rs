//! SQLite implementation of the entity store.

use crate::db::{Database, EntityStore};
use crate::error::{Error, Result};
use crate::types::{
    Entity, EntityDraft, Observation, ObservationCategory, ObservationDraft, Relation,
    RelationDraft,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};

/// Entity/observation/relation store backed by SQLite.
pub struct SqliteStore {
    db: Database,
    project_id: i64,
}

impl SqliteStore {
    pub fn new(db: Database, project_id: i64) -> Self {
        Self { db, project_id }
    }

    fn row_to_entity(row: &Row) -> rusqlite::Result<Entity> {
        let metadata_str: String = row.get("entity_metadata")?;
        let created_at_str: String = row.get("created_at")?;
        let updated_at_str: String = row.get("updated_at")?;

        Ok(Entity {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            title: row.get("title")?,
            entity_type: row.get("entity_type")?,
            content_type: row.get("content_type")?,
            permalink: row.get("permalink")?,
            file_path: row.get("file_path")?,
            checksum: row.get("checksum")?,
            entity_metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
            created_at: parse_ts(&created_at_str),
            updated_at: parse_ts(&updated_at_str),
        })
    }

    fn row_to_relation(row: &Row) -> rusqlite::Result<Relation> {
        Ok(Relation {
            id: row.get("id")?,
            from_id: row.get("from_id")?,
            to_id: row.get("to_id")?,
            to_name: row.get("to_name")?,
            relation_type: row.get("relation_type")?,
            context: row.get("context")?,
        })
    }

    fn row_to_observation(row: &Row) -> rusqlite::Result<Observation> {
        let category_str: String = row.get("category")?;
        let tags_str: String = row.get("tags")?;

        Ok(Observation {
            id: row.get("id")?,
            entity_id: row.get("entity_id")?,
            category: ObservationCategory::from_raw(&category_str),
            content: row.get("content")?,
            tags: serde_json::from_str(&tags_str).unwrap_or_default(),
            context: row.get("context")?,
        })
    }
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Map a unique-key violation onto [`Error::Conflict`] for the permalink
/// being written.
fn map_conflict(err: rusqlite::Error, permalink: &str) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Conflict {
                permalink: permalink.to_string(),
            }
        }
        _ => Error::Database(err),
    }
}

impl EntityStore for SqliteStore {
    fn project_id(&self) -> i64 {
        self.project_id
    }

    fn create_entity(&self, draft: &EntityDraft) -> Result<Entity> {
        let conn = self.db.connection();
        let now = Utc::now();
        let created_at = draft.created_at.unwrap_or(now);
        let metadata = serde_json::Value::Object(draft.entity_metadata.clone()).to_string();

        conn.execute(
            r#"
            INSERT INTO entity (project_id, title, entity_type, content_type, permalink,
                                file_path, checksum, entity_metadata, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9)
            "#,
            params![
                self.project_id,
                draft.title,
                draft.entity_type,
                draft.content_type,
                draft.permalink,
                draft.file_path,
                metadata,
                created_at.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| map_conflict(e, &draft.permalink))?;

        let id = conn.last_insert_rowid();
        conn.query_row("SELECT * FROM entity WHERE id = ?", [id], Self::row_to_entity)
            .map_err(Error::from)
    }

    fn update_entity_fields(&self, entity_id: i64, draft: &EntityDraft) -> Result<Entity> {
        let conn = self.db.connection();
        let metadata = serde_json::Value::Object(draft.entity_metadata.clone()).to_string();

        conn.execute(
            r#"
            UPDATE entity
            SET title = ?1,
                entity_type = ?2,
                content_type = ?3,
                permalink = ?4,
                entity_metadata = ?5,
                checksum = NULL,
                updated_at = ?6
            WHERE id = ?7
            "#,
            params![
                draft.title,
                draft.entity_type,
                draft.content_type,
                draft.permalink,
                metadata,
                Utc::now().to_rfc3339(),
                entity_id,
            ],
        )
        .map_err(|e| map_conflict(e, &draft.permalink))?;

        conn.query_row("SELECT * FROM entity WHERE id = ?", [entity_id], Self::row_to_entity)
            .map_err(Error::from)
    }

    fn get_entity(&self, entity_id: i64) -> Result<Option<Entity>> {
        let conn = self.db.connection();
        conn.query_row(
            "SELECT * FROM entity WHERE id = ? AND project_id = ?",
            params![entity_id, self.project_id],
            Self::row_to_entity,
        )
        .optional()
        .map_err(Error::from)
    }

    fn find_by_permalink(&self, permalink: &str) -> Result<Option<Entity>> {
        let conn = self.db.connection();
        conn.query_row(
            "SELECT * FROM entity WHERE project_id = ? AND permalink = ?",
            params![self.project_id, permalink],
            Self::row_to_entity,
        )
        .optional()
        .map_err(Error::from)
    }

    fn find_by_title(&self, title: &str) -> Result<Option<Entity>> {
        let conn = self.db.connection();
        conn.query_row(
            "SELECT * FROM entity WHERE project_id = ? AND title = ? COLLATE NOCASE
             ORDER BY updated_at DESC LIMIT 1",
            params![self.project_id, title],
            Self::row_to_entity,
        )
        .optional()
        .map_err(Error::from)
    }

    fn find_by_file_path(&self, file_path: &str) -> Result<Option<Entity>> {
        let conn = self.db.connection();
        conn.query_row(
            "SELECT * FROM entity WHERE project_id = ? AND file_path = ?",
            params![self.project_id, file_path],
            Self::row_to_entity,
        )
        .optional()
        .map_err(Error::from)
    }

    fn find_by_permalink_prefix(&self, prefix: &str) -> Result<Vec<Entity>> {
        let conn = self.db.connection();
        let pattern = format!("{}%", prefix.replace('%', "").replace('_', "\\_"));
        let mut stmt = conn.prepare(
            "SELECT * FROM entity WHERE project_id = ? AND permalink LIKE ? ESCAPE '\\'
             ORDER BY permalink",
        )?;
        let entities = stmt
            .query_map(params![self.project_id, pattern], Self::row_to_entity)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    fn list_entities(&self) -> Result<Vec<Entity>> {
        let conn = self.db.connection();
        let mut stmt =
            conn.prepare("SELECT * FROM entity WHERE project_id = ? ORDER BY file_path")?;
        let entities = stmt
            .query_map([self.project_id], Self::row_to_entity)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    fn list_checksums(&self) -> Result<HashMap<String, String>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT file_path, checksum FROM entity
             WHERE project_id = ? AND checksum IS NOT NULL",
        )?;
        let checksums = stmt
            .query_map([self.project_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(checksums)
    }

    fn replace_observations(&self, entity_id: i64, observations: &[ObservationDraft]) -> Result<()> {
        let mut conn = self.db.connection();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM observation WHERE entity_id = ?", [entity_id])?;
        for obs in observations {
            // Unknown categories land in the closed set as 'note'
            let category = ObservationCategory::from_raw(&obs.category);
            tx.execute(
                r#"
                INSERT INTO observation (entity_id, category, content, tags, context)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    entity_id,
                    category.as_str(),
                    obs.content,
                    serde_json::to_string(&obs.tags).unwrap_or_else(|_| "[]".to_string()),
                    obs.context,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn replace_relations(&self, entity_id: i64, relations: &[RelationDraft]) -> Result<()> {
        let mut conn = self.db.connection();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM relation WHERE from_id = ?", [entity_id])?;

        // Duplicate (target, type) pairs collapse to the first occurrence
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for rel in relations {
            let key = (rel.to_name.to_lowercase(), rel.relation_type.clone());
            if !seen.insert(key) {
                tracing::debug!(
                    to_name = %rel.to_name,
                    relation_type = %rel.relation_type,
                    "Skipping duplicate relation"
                );
                continue;
            }
            tx.execute(
                r#"
                INSERT INTO relation (from_id, to_id, to_name, relation_type, context)
                VALUES (?1, NULL, ?2, ?3, ?4)
                "#,
                params![entity_id, rel.to_name, rel.relation_type, rel.context],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn set_checksum(&self, entity_id: i64, checksum: &str) -> Result<()> {
        let conn = self.db.connection();
        conn.execute(
            "UPDATE entity SET checksum = ?1 WHERE id = ?2",
            params![checksum, entity_id],
        )?;
        Ok(())
    }

    fn delete_entity_by_file(&self, file_path: &str) -> Result<bool> {
        let conn = self.db.connection();
        let deleted = conn.execute(
            "DELETE FROM entity WHERE project_id = ? AND file_path = ?",
            params![self.project_id, file_path],
        )?;
        Ok(deleted > 0)
    }

    fn update_file_path(&self, entity_id: i64, file_path: &str, permalink: &str) -> Result<()> {
        let conn = self.db.connection();
        conn.execute(
            "UPDATE entity SET file_path = ?1, permalink = ?2, updated_at = ?3 WHERE id = ?4",
            params![file_path, permalink, Utc::now().to_rfc3339(), entity_id],
        )
        .map_err(|e| map_conflict(e, permalink))?;
        Ok(())
    }

    fn observations(&self, entity_id: i64) -> Result<Vec<Observation>> {
        let conn = self.db.connection();
        let mut stmt =
            conn.prepare("SELECT * FROM observation WHERE entity_id = ? ORDER BY id")?;
        let observations = stmt
            .query_map([entity_id], Self::row_to_observation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(observations)
    }

    fn outgoing_relations(&self, entity_id: i64) -> Result<Vec<Relation>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare("SELECT * FROM relation WHERE from_id = ? ORDER BY id")?;
        let relations = stmt
            .query_map([entity_id], Self::row_to_relation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(relations)
    }

    fn incoming_relations(&self, entity_id: i64) -> Result<Vec<Relation>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare("SELECT * FROM relation WHERE to_id = ? ORDER BY id")?;
        let relations = stmt
            .query_map([entity_id], Self::row_to_relation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(relations)
    }

    fn resolve_relation(&self, relation_id: i64, to_id: i64) -> Result<()> {
        let conn = self.db.connection();
        conn.execute(
            "UPDATE relation SET to_id = ?1 WHERE id = ?2",
            params![to_id, relation_id],
        )?;
        Ok(())
    }

    fn find_unresolved_relations(&self) -> Result<Vec<Relation>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            r#"
            SELECT r.*
            FROM relation r
            JOIN entity e ON e.id = r.from_id
            WHERE e.project_id = ? AND r.to_id IS NULL
            ORDER BY r.id
            "#,
        )?;
        let relations = stmt
            .query_map([self.project_id], Self::row_to_relation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(relations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        SqliteStore::new(db, 1)
    }

    fn draft(title: &str, permalink: &str, file_path: &str) -> EntityDraft {
        EntityDraft {
            title: title.to_string(),
            entity_type: "note".to_string(),
            content_type: "text/markdown".to_string(),
            permalink: permalink.to_string(),
            file_path: file_path.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_and_lookup() {
        let store = store();
        let entity = store
            .create_entity(&draft("Alpha", "notes/alpha", "notes/alpha.md"))
            .unwrap();

        assert!(entity.checksum.is_none());
        assert_eq!(entity.project_id, 1);

        // Permalink lookup is case-insensitive
        let found = store.find_by_permalink("Notes/Alpha").unwrap().unwrap();
        assert_eq!(found.id, entity.id);

        let by_title = store.find_by_title("alpha").unwrap().unwrap();
        assert_eq!(by_title.id, entity.id);
    }

    #[test]
    fn test_duplicate_permalink_conflicts() {
        let store = store();
        store
            .create_entity(&draft("Alpha", "notes/alpha", "notes/alpha.md"))
            .unwrap();

        let err = store
            .create_entity(&draft("Other", "notes/alpha", "notes/other.md"))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn test_list_checksums_skips_incomplete() {
        let store = store();
        let a = store
            .create_entity(&draft("Alpha", "notes/alpha", "notes/alpha.md"))
            .unwrap();
        store
            .create_entity(&draft("Beta", "notes/beta", "notes/beta.md"))
            .unwrap();

        store.set_checksum(a.id, "abc123").unwrap();

        let checksums = store.list_checksums().unwrap();
        assert_eq!(checksums.len(), 1);
        assert_eq!(checksums.get("notes/alpha.md").map(String::as_str), Some("abc123"));
    }

    #[test]
    fn test_replace_observations_is_full_replace() {
        let store = store();
        let entity = store
            .create_entity(&draft("Alpha", "notes/alpha", "notes/alpha.md"))
            .unwrap();

        let first = vec![ObservationDraft {
            category: "tech".to_string(),
            content: "uses SQLite".to_string(),
            tags: vec!["store".to_string()],
            context: None,
        }];
        store.replace_observations(entity.id, &first).unwrap();

        let second = vec![ObservationDraft {
            category: "weird-category".to_string(),
            content: "revisited".to_string(),
            tags: vec![],
            context: None,
        }];
        store.replace_observations(entity.id, &second).unwrap();

        let observations = store.observations(entity.id).unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].content, "revisited");
        // Unknown category normalized
        assert_eq!(observations[0].category, ObservationCategory::Note);
    }

    #[test]
    fn test_replace_relations_dedupes() {
        let store = store();
        let entity = store
            .create_entity(&draft("Alpha", "notes/alpha", "notes/alpha.md"))
            .unwrap();

        let rels = vec![
            RelationDraft {
                relation_type: "depends_on".to_string(),
                to_name: "Beta".to_string(),
                context: None,
            },
            RelationDraft {
                relation_type: "depends_on".to_string(),
                to_name: "beta".to_string(),
                context: Some("dup".to_string()),
            },
            RelationDraft {
                relation_type: "relates_to".to_string(),
                to_name: "Beta".to_string(),
                context: None,
            },
        ];
        store.replace_relations(entity.id, &rels).unwrap();

        let stored = store.outgoing_relations(entity.id).unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.to_id.is_none()));
        assert_eq!(stored[0].to_name, "Beta");
    }

    #[test]
    fn test_delete_cascades_and_unresolves() {
        let store = store();
        let alpha = store
            .create_entity(&draft("Alpha", "notes/alpha", "notes/alpha.md"))
            .unwrap();
        let beta = store
            .create_entity(&draft("Beta", "notes/beta", "notes/beta.md"))
            .unwrap();

        store
            .replace_relations(
                alpha.id,
                &[RelationDraft {
                    relation_type: "depends_on".to_string(),
                    to_name: "Beta".to_string(),
                    context: None,
                }],
            )
            .unwrap();
        let rel = &store.outgoing_relations(alpha.id).unwrap()[0];
        store.resolve_relation(rel.id, beta.id).unwrap();

        // Deleting the target leaves the edge unresolved, name intact
        assert!(store.delete_entity_by_file("notes/beta.md").unwrap());
        let rels = store.outgoing_relations(alpha.id).unwrap();
        assert_eq!(rels.len(), 1);
        assert!(rels[0].to_id.is_none());
        assert_eq!(rels[0].to_name, "Beta");

        // Deleting the source removes its relations entirely
        assert!(store.delete_entity_by_file("notes/alpha.md").unwrap());
        assert!(store.find_unresolved_relations().unwrap().is_empty());
    }

    #[test]
    fn test_update_file_path_keeps_id() {
        let store = store();
        let entity = store
            .create_entity(&draft("Alpha", "notes/alpha", "notes/alpha.md"))
            .unwrap();
        store.set_checksum(entity.id, "abc").unwrap();

        store
            .update_file_path(entity.id, "notes/archive/alpha.md", "notes/archive/alpha")
            .unwrap();

        let moved = store.get_entity(entity.id).unwrap().unwrap();
        assert_eq!(moved.file_path, "notes/archive/alpha.md");
        assert_eq!(moved.permalink, "notes/archive/alpha");
        assert_eq!(moved.checksum.as_deref(), Some("abc"));
    }

    #[test]
    fn test_permalink_prefix() {
        let store = store();
        store
            .create_entity(&draft("Alpha", "notes/alpha", "notes/alpha.md"))
            .unwrap();
        store
            .create_entity(&draft("Beta", "notes/beta", "notes/beta.md"))
            .unwrap();
        store
            .create_entity(&draft("Gamma", "specs/gamma", "specs/gamma.md"))
            .unwrap();

        let notes = store.find_by_permalink_prefix("notes/").unwrap();
        assert_eq!(notes.len(), 2);
    }
}
