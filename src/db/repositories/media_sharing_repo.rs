//! Media sharing record repository

use crate::db::sql_utils::build_in_clause_placeholders;
use crate::db::Database;
use crate::models::{MediaSharingRecord, MediaSharingRole, MediaSharingState};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, OptionalExtension, Result as SqliteResult, Row};

const SELECT_COLUMNS: &str = "SELECT id, connection_id, thread_id, state, role, description,
        items_json, metadata_json, created_at, updated_at
 FROM media_sharing_records";

/// Tag filter for record lookups. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    pub connection_id: Option<String>,
    pub thread_id: Option<String>,
    pub role: Option<MediaSharingRole>,
    /// Match any of these states (empty = any state)
    pub states: Vec<MediaSharingState>,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = Some(connection_id.into());
        self
    }

    pub fn thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn role(mut self, role: MediaSharingRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn state(mut self, state: MediaSharingState) -> Self {
        self.states.push(state);
        self
    }

    fn to_sql(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(connection_id) = &self.connection_id {
            clauses.push("connection_id = ?".to_string());
            values.push(connection_id.clone());
        }
        if let Some(thread_id) = &self.thread_id {
            clauses.push("thread_id = ?".to_string());
            values.push(thread_id.clone());
        }
        if let Some(role) = self.role {
            clauses.push("role = ?".to_string());
            values.push(role.as_str().to_string());
        }
        if !self.states.is_empty() {
            clauses.push(format!(
                "state IN ({})",
                build_in_clause_placeholders(self.states.len())
            ));
            values.extend(self.states.iter().map(|s| s.as_str().to_string()));
        }

        let mut sql = SELECT_COLUMNS.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at ASC, rowid ASC");

        (sql, values)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> SqliteResult<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn row_to_record(row: &Row<'_>) -> SqliteResult<MediaSharingRecord> {
    let state: String = row.get(3)?;
    let role: String = row.get(4)?;
    let items_json: String = row.get(6)?;
    let metadata_json: String = row.get(7)?;

    Ok(MediaSharingRecord {
        id: row.get(0)?,
        connection_id: row.get(1)?,
        thread_id: row.get(2)?,
        state: state
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        role: role
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        description: row.get(5)?,
        items: serde_json::from_str(&items_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        metadata: serde_json::from_str(&metadata_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Repository for media sharing record rows
pub struct MediaSharingRepository;

impl MediaSharingRepository {
    /// Insert a new record. Returns false if the id is already taken.
    pub fn insert(db: &Database, record: &MediaSharingRecord) -> SqliteResult<bool> {
        let items_json = to_json(&record.items)?;
        let metadata_json = to_json(&record.metadata)?;

        db.with_connection(|conn| {
            let rows = conn.execute(
                "INSERT OR IGNORE INTO media_sharing_records
                    (id, connection_id, thread_id, state, role, description,
                     items_json, metadata_json, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id,
                    record.connection_id,
                    record.thread_id,
                    record.state.as_str(),
                    record.role.as_str(),
                    record.description,
                    items_json,
                    metadata_json,
                    record.created_at,
                    record.updated_at,
                ],
            )?;
            Ok(rows > 0)
        })
    }

    /// Overwrite the mutable columns of a record. Returns false if absent.
    ///
    /// `id`, `connection_id` and `created_at` are never rewritten.
    pub fn update(db: &Database, record: &MediaSharingRecord) -> SqliteResult<bool> {
        let items_json = to_json(&record.items)?;
        let metadata_json = to_json(&record.metadata)?;

        db.with_connection(|conn| {
            let rows = conn.execute(
                "UPDATE media_sharing_records
                 SET thread_id = ?, state = ?, role = ?, description = ?,
                     items_json = ?, metadata_json = ?, updated_at = ?
                 WHERE id = ?",
                params![
                    record.thread_id,
                    record.state.as_str(),
                    record.role.as_str(),
                    record.description,
                    items_json,
                    metadata_json,
                    record.updated_at,
                    record.id,
                ],
            )?;
            Ok(rows > 0)
        })
    }

    /// Get a record by ID
    pub fn get_by_id(db: &Database, id: &str) -> SqliteResult<Option<MediaSharingRecord>> {
        db.with_connection(|conn| {
            conn.query_row(&format!("{} WHERE id = ?", SELECT_COLUMNS), [id], row_to_record)
                .optional()
        })
    }

    /// Get the record for one exchange on a connection
    pub fn get_by_connection_and_thread(
        db: &Database,
        connection_id: &str,
        thread_id: &str,
    ) -> SqliteResult<Option<MediaSharingRecord>> {
        db.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "{} WHERE connection_id = ? AND thread_id = ? ORDER BY created_at ASC, rowid ASC LIMIT 1",
                    SELECT_COLUMNS
                ),
                [connection_id, thread_id],
                row_to_record,
            )
            .optional()
        })
    }

    /// Get all records matching a tag filter, oldest first
    pub fn query(db: &Database, query: &RecordQuery) -> SqliteResult<Vec<MediaSharingRecord>> {
        let (sql, values) = query.to_sql();

        db.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt.query_map(params_from_iter(values.iter()), row_to_record)?;
            records.collect()
        })
    }

    /// Get all records, oldest first
    pub fn get_all(db: &Database) -> SqliteResult<Vec<MediaSharingRecord>> {
        Self::query(db, &RecordQuery::default())
    }

    /// Delete a record
    pub fn delete(db: &Database, id: &str) -> SqliteResult<bool> {
        db.with_connection(|conn| {
            let rows = conn.execute("DELETE FROM media_sharing_records WHERE id = ?", [id])?;
            Ok(rows > 0)
        })
    }
}
