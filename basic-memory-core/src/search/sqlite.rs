//! FTS5-backed search index.

use crate::db::Database;
use crate::error::{Error, Result};
use crate::search::{
    Comparison, FilterOp, MetadataFilter, SearchBackend, SearchQuery, SearchResult, SearchRow,
};
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use serde_json::Value;

/// Search backend over the SQLite FTS5 `search_index` table.
///
/// Shares the store's connection, so index writes serialize with store
/// writes for the same file.
pub struct SqliteSearchIndex {
    db: Database,
    project_id: i64,
}

impl SqliteSearchIndex {
    pub fn new(db: Database, project_id: i64) -> Self {
        Self { db, project_id }
    }
}

impl SearchBackend for SqliteSearchIndex {
    fn index_row(&self, row: &SearchRow) -> Result<()> {
        let mut conn = self.db.connection();
        let tx = conn.transaction()?;

        // FTS5 has no ON CONFLICT; replace by hand
        tx.execute(
            "DELETE FROM search_index WHERE project_id = ?1 AND permalink = ?2",
            rusqlite::params![self.project_id, row.permalink],
        )?;
        tx.execute(
            r#"
            INSERT INTO search_index (title, content_stems, content_snippet, permalink,
                                      file_path, type, entity_id, metadata,
                                      created_at, updated_at, project_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            rusqlite::params![
                row.title,
                row.content_stems,
                row.content_snippet,
                row.permalink,
                row.file_path,
                row.item_type.as_str(),
                row.entity_id,
                row.metadata.to_string(),
                row.created_at.to_rfc3339(),
                row.updated_at.to_rfc3339(),
                self.project_id,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn delete_row(&self, permalink: &str) -> Result<()> {
        let conn = self.db.connection();
        conn.execute(
            "DELETE FROM search_index WHERE project_id = ?1 AND permalink = ?2",
            rusqlite::params![self.project_id, permalink],
        )?;
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        let conn = self.db.connection();
        conn.execute(
            "DELETE FROM search_index WHERE project_id = ?",
            [self.project_id],
        )?;
        Ok(())
    }

    fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let match_expr = build_match_expr(&query.text)?;

        let mut sql = String::from(
            r#"
            SELECT title, permalink, file_path, type, entity_id, content_snippet,
                   metadata, created_at, updated_at
            FROM search_index
            WHERE project_id = ? AND search_index MATCH ?
            "#,
        );
        let mut params: Vec<Box<dyn ToSql>> =
            vec![Box::new(self.project_id), Box::new(match_expr)];

        if let Some(types) = &query.types {
            if !types.is_empty() {
                let placeholders = vec!["?"; types.len()].join(", ");
                sql.push_str(&format!(" AND type IN ({placeholders})"));
                for t in types {
                    params.push(Box::new(t.as_str().to_string()));
                }
            }
        }

        if let Some(entity_types) = &query.entity_types {
            if !entity_types.is_empty() {
                let placeholders = vec!["?"; entity_types.len()].join(", ");
                sql.push_str(&format!(
                    " AND json_extract(metadata, '$.\"entity_type\"') IN ({placeholders})"
                ));
                for t in entity_types {
                    params.push(Box::new(t.clone()));
                }
            }
        }

        if let Some(after) = &query.after_date {
            sql.push_str(" AND created_at >= ?");
            params.push(Box::new(after.to_rfc3339()));
        }

        if let Some(filters) = &query.metadata_filters {
            for filter in crate::search::parse_metadata_filters(filters)? {
                let clause = metadata_filter_sql(&filter, &mut params);
                sql.push_str(" AND ");
                sql.push_str(&clause);
            }
        }

        sql.push_str(" ORDER BY bm25(search_index), updated_at DESC LIMIT ?");
        params.push(Box::new(query.limit.unwrap_or(50) as i64));

        let conn = self.db.connection();
        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut results = stmt
            .query_map(params_refs.as_slice(), |row| {
                let type_str: String = row.get(3)?;
                let metadata_str: String = row.get(6)?;
                let created_at_str: String = row.get(7)?;
                let updated_at_str: String = row.get(8)?;

                Ok(SearchResult {
                    title: row.get(0)?,
                    permalink: row.get(1)?,
                    file_path: row.get(2)?,
                    item_type: type_str.parse().unwrap_or(crate::search::SearchItemType::Entity),
                    entity_id: row.get(4)?,
                    score: 0.0,
                    snippet: row.get(5)?,
                    metadata: serde_json::from_str(&metadata_str)
                        .unwrap_or(Value::Object(Default::default())),
                    created_at: parse_ts(&created_at_str),
                    updated_at: parse_ts(&updated_at_str),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Positional rank over the bm25 ordering, lowest is best
        for (i, result) in results.iter_mut().enumerate() {
            result.score = (i + 1) as f64;
        }

        Ok(results)
    }
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Build an FTS5 MATCH expression from free text.
///
/// Tokens are quoted (the tokenizer keeps `/` inside tokens, so path
/// segments match verbatim); a trailing `*` becomes a prefix query.
fn build_match_expr(text: &str) -> Result<String> {
    let mut terms = Vec::new();

    for token in text.split_whitespace() {
        let (token, prefix) = match token.strip_suffix('*') {
            Some(stripped) => (stripped, true),
            None => (token, false),
        };
        let cleaned = token.trim_matches('"');
        if cleaned.is_empty() {
            continue;
        }
        let quoted = format!("\"{}\"", cleaned.replace('"', "\"\""));
        terms.push(if prefix { format!("{quoted}*") } else { quoted });
    }

    if terms.is_empty() {
        return Err(Error::Query("search text is required".to_string()));
    }
    Ok(terms.join(" "))
}

/// Render one metadata filter clause, pushing its parameters.
fn metadata_filter_sql(filter: &MetadataFilter, params: &mut Vec<Box<dyn ToSql>>) -> String {
    let path = filter.json_path();
    let extract = format!("json_extract(metadata, '{path}')");

    match filter.op {
        FilterOp::Eq => {
            let value = &filter.values[0];
            params.push(value_param(value));
            params.push(value_param(value));
            format!(
                "({extract} = ? OR EXISTS (SELECT 1 FROM json_each(metadata, '{path}') \
                 WHERE json_each.value = ?))"
            )
        }
        FilterOp::Contains => {
            let clauses: Vec<String> = filter
                .values
                .iter()
                .map(|value| {
                    params.push(value_param(value));
                    format!(
                        "EXISTS (SELECT 1 FROM json_each(metadata, '{path}') \
                         WHERE json_each.value = ?)"
                    )
                })
                .collect();
            format!("({})", clauses.join(" AND "))
        }
        FilterOp::In => {
            let placeholders = vec!["?"; filter.values.len()].join(", ");
            for value in &filter.values {
                params.push(value_param(value));
            }
            format!("{extract} IN ({placeholders})")
        }
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            let op = match filter.op {
                FilterOp::Gt => ">",
                FilterOp::Gte => ">=",
                FilterOp::Lt => "<",
                _ => "<=",
            };
            params.push(value_param(&filter.values[0]));
            match filter.comparison {
                Comparison::Numeric => format!("CAST({extract} AS REAL) {op} CAST(? AS REAL)"),
                Comparison::Text => format!("{extract} {op} ?"),
            }
        }
        FilterOp::Between => {
            params.push(value_param(&filter.values[0]));
            params.push(value_param(&filter.values[1]));
            match filter.comparison {
                Comparison::Numeric => format!(
                    "(CAST({extract} AS REAL) >= CAST(? AS REAL) \
                     AND CAST({extract} AS REAL) <= CAST(? AS REAL))"
                ),
                Comparison::Text => format!("({extract} >= ? AND {extract} <= ?)"),
            }
        }
    }
}

fn value_param(value: &Value) -> Box<dyn ToSql> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Box::new(i)
            } else {
                Box::new(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::Bool(b) => Box::new(*b),
        Value::String(s) => Box::new(s.clone()),
        other => Box::new(other.to_string()),
    }
}
