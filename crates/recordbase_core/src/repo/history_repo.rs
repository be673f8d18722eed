//! Append-only audit history persistence.
//!
//! # Invariants
//! - There is no update or delete path; the storage trigger rejects updates.
//! - Lists are newest first (`created_at DESC, id DESC`).

use crate::model::history::{HistoryAction, HistoryEntry, HistoryId, NewHistoryEntry};
use crate::model::record::RecordId;
use crate::repo::{RepoError, RepoResult, SqliteStore};
use rusqlite::{params, Connection, OptionalExtension, Row};

const HISTORY_SELECT_SQL: &str = "SELECT
    id,
    record_id,
    action,
    field_name,
    old_value,
    new_value,
    description,
    created_by,
    created_at
FROM record_history";

pub trait HistoryRepository {
    /// Appends one entry outside any record mutation (e.g. a user note).
    fn append_history(&self, record_id: RecordId, entry: &NewHistoryEntry)
        -> RepoResult<HistoryEntry>;
    fn list_history(&self, record_id: RecordId) -> RepoResult<Vec<HistoryEntry>>;
}

impl HistoryRepository for SqliteStore<'_> {
    fn append_history(
        &self,
        record_id: RecordId,
        entry: &NewHistoryEntry,
    ) -> RepoResult<HistoryEntry> {
        let id = insert_history(self.conn, record_id, entry)?;
        let sql = format!("{HISTORY_SELECT_SQL} WHERE id = ?1;");
        self.conn
            .query_row(&sql, [id], |row| Ok(parse_history_row(row)))
            .optional()?
            .transpose()?
            .ok_or_else(|| RepoError::not_found("history entry", id))
    }

    fn list_history(&self, record_id: RecordId) -> RepoResult<Vec<HistoryEntry>> {
        let sql = format!(
            "{HISTORY_SELECT_SQL}
             WHERE record_id = ?1
             ORDER BY created_at DESC, id DESC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([record_id])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_history_row(row)?);
        }
        Ok(entries)
    }
}

/// Inserts one entry on `conn`, which may be an open transaction.
pub(crate) fn insert_history(
    conn: &Connection,
    record_id: RecordId,
    entry: &NewHistoryEntry,
) -> RepoResult<HistoryId> {
    conn.execute(
        "INSERT INTO record_history (
            record_id,
            action,
            field_name,
            old_value,
            new_value,
            description,
            created_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            record_id,
            entry.action.as_str(),
            entry.field_name.as_deref(),
            entry.old_value.as_deref(),
            entry.new_value.as_deref(),
            entry.description.as_str(),
            entry.created_by,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn parse_history_row(row: &Row<'_>) -> RepoResult<HistoryEntry> {
    let raw_action: String = row.get(2)?;
    let action = HistoryAction::parse(&raw_action)
        .ok_or_else(|| RepoError::InvalidData(format!("unknown history action `{raw_action}`")))?;
    Ok(HistoryEntry {
        id: row.get(0)?,
        record_id: row.get(1)?,
        action,
        field_name: row.get(3)?,
        old_value: row.get(4)?,
        new_value: row.get(5)?,
        description: row.get(6)?,
        created_by: row.get(7)?,
        created_at: row.get(8)?,
    })
}
