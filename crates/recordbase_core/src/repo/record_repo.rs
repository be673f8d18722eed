//! Record persistence with history-in-transaction writes.
//!
//! # Responsibility
//! - Store records and their per-user view markers.
//! - Write record mutations and their audit entries atomically.
//! - Resolve parent/child structure for counts and deletion.
//!
//! # Invariants
//! - `insert_record` and `update_record` never commit without their history.
//! - Lists are sorted by `created_at DESC, id DESC`.
//! - Deletion removes children before parents; attachment rows cascade.

use crate::model::history::NewHistoryEntry;
use crate::model::module::ModuleId;
use crate::model::principal::UserId;
use crate::model::record::{
    ChildrenCount, DeletedRecord, Record, RecordDeleteMode, RecordId, RecordSummary,
    SubModuleCount,
};
use crate::model::value::RecordData;
use crate::repo::history_repo::insert_history;
use crate::repo::{parse_json_column, to_json_column, RepoError, RepoResult, SqliteStore};
use rusqlite::{params, Connection, OptionalExtension, Row};

const RECORDS_DEFAULT_LIMIT: u32 = 100;
const RECORDS_LIMIT_MAX: u32 = 500;

const RECORD_COLUMNS: &str = "r.id,
    r.module_id,
    r.name,
    r.status,
    r.data,
    r.parent_record_id,
    r.assigned_to,
    r.created_by,
    r.updated_by,
    r.version,
    r.created_at,
    r.updated_at";

const RECORD_COLUMN_COUNT: usize = 12;

/// Query options for record lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordListQuery {
    pub status: Option<String>,
    pub assigned_to: Option<UserId>,
    pub parent_record_id: Option<RecordId>,
    /// Maximum rows to return. Defaults to 100 and clamps to 500.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Columns of a record about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    pub module_id: ModuleId,
    pub name: String,
    pub status: String,
    pub data: RecordData,
    pub parent_record_id: Option<RecordId>,
    pub assigned_to: Option<UserId>,
    pub created_by: Option<UserId>,
}

/// Resolved post-update state of the mutable record columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange {
    pub name: String,
    pub status: String,
    pub data: RecordData,
    pub assigned_to: Option<UserId>,
    pub updated_by: Option<UserId>,
}

/// Rows removed by a deletion plus the files they referenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRemoval {
    pub deleted: DeletedRecord,
    /// Upload-root-relative paths of every removed image and document.
    pub file_paths: Vec<String>,
}

pub trait RecordRepository {
    fn find_record(&self, id: RecordId) -> RepoResult<Option<Record>>;
    /// Lists one module's records with `viewer`'s view flags.
    fn list_records(
        &self,
        module_id: ModuleId,
        viewer: UserId,
        query: &RecordListQuery,
    ) -> RepoResult<Vec<RecordSummary>>;
    /// Inserts a record and its `created` entry in one transaction.
    fn insert_record(&self, row: &RecordRow, created: &NewHistoryEntry) -> RepoResult<Record>;
    /// Applies `change`, bumps `version`, appends `entries`, clears other users' view markers.
    ///
    /// With `expected_version` set, a stale version fails with `VersionMismatch`.
    fn update_record(
        &self,
        id: RecordId,
        change: &RecordChange,
        expected_version: Option<i64>,
        entries: &[NewHistoryEntry],
    ) -> RepoResult<Record>;
    fn mark_viewed(&self, record_id: RecordId, user_id: UserId) -> RepoResult<()>;
    fn list_children(&self, parent_id: RecordId, module_id: ModuleId) -> RepoResult<Vec<Record>>;
    fn count_children(&self, parent_id: RecordId) -> RepoResult<ChildrenCount>;
    /// Distinct modules of `id` and all of its descendants.
    fn subtree_module_ids(&self, id: RecordId) -> RepoResult<Vec<ModuleId>>;
    fn delete_record(&self, id: RecordId, mode: RecordDeleteMode) -> RepoResult<RecordRemoval>;
}

impl RecordRepository for SqliteStore<'_> {
    fn find_record(&self, id: RecordId) -> RepoResult<Option<Record>> {
        find_record_on(self.conn, id)
    }

    fn list_records(
        &self,
        module_id: ModuleId,
        viewer: UserId,
        query: &RecordListQuery,
    ) -> RepoResult<Vec<RecordSummary>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS},
                EXISTS (
                    SELECT 1 FROM record_views v
                    WHERE v.record_id = r.id AND v.user_id = ?2
                ) AS is_viewed,
                (
                    SELECT i.file_path FROM record_images i
                    WHERE i.record_id = r.id
                    ORDER BY i.sort_order ASC, i.id ASC
                    LIMIT 1
                ) AS thumbnail
             FROM records r
             WHERE r.module_id = ?1
               AND (?3 IS NULL OR r.status = ?3)
               AND (?4 IS NULL OR r.assigned_to = ?4)
               AND (?5 IS NULL OR r.parent_record_id = ?5)
             ORDER BY r.created_at DESC, r.id DESC
             LIMIT ?6 OFFSET ?7;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![
            module_id,
            viewer,
            query.status.as_deref(),
            query.assigned_to,
            query.parent_record_id,
            i64::from(normalize_record_limit(query.limit)),
            i64::from(query.offset),
        ])?;

        let mut summaries = Vec::new();
        while let Some(row) = rows.next()? {
            let record = parse_record_row(row)?;
            let is_viewed: i64 = row.get(RECORD_COLUMN_COUNT)?;
            summaries.push(RecordSummary {
                record,
                is_viewed: is_viewed != 0,
                thumbnail: row.get(RECORD_COLUMN_COUNT + 1)?,
            });
        }
        Ok(summaries)
    }

    fn insert_record(&self, row: &RecordRow, created: &NewHistoryEntry) -> RepoResult<Record> {
        let tx = self.immediate()?;
        tx.execute(
            "INSERT INTO records (
                module_id,
                name,
                status,
                data,
                parent_record_id,
                assigned_to,
                created_by,
                updated_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7);",
            params![
                row.module_id,
                row.name.as_str(),
                row.status.as_str(),
                to_json_column(&row.data, "records.data")?,
                row.parent_record_id,
                row.assigned_to,
                row.created_by,
            ],
        )?;
        let id = tx.last_insert_rowid();
        insert_history(&tx, id, created)?;
        let record = require_record(&tx, id)?;
        tx.commit()?;
        Ok(record)
    }

    fn update_record(
        &self,
        id: RecordId,
        change: &RecordChange,
        expected_version: Option<i64>,
        entries: &[NewHistoryEntry],
    ) -> RepoResult<Record> {
        let tx = self.immediate()?;
        let changed = tx.execute(
            "UPDATE records
             SET name = ?2,
                 status = ?3,
                 data = ?4,
                 assigned_to = ?5,
                 updated_by = ?6,
                 version = version + 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND (?7 IS NULL OR version = ?7);",
            params![
                id,
                change.name.as_str(),
                change.status.as_str(),
                to_json_column(&change.data, "records.data")?,
                change.assigned_to,
                change.updated_by,
                expected_version,
            ],
        )?;
        if changed == 0 {
            let actual: Option<i64> = tx
                .query_row("SELECT version FROM records WHERE id = ?1;", [id], |row| {
                    row.get(0)
                })
                .optional()?;
            return Err(match (actual, expected_version) {
                (Some(actual), Some(expected)) => RepoError::VersionMismatch {
                    record_id: id,
                    expected,
                    actual,
                },
                _ => RepoError::not_found("record", id),
            });
        }

        for entry in entries {
            insert_history(&tx, id, entry)?;
        }
        tx.execute(
            "DELETE FROM record_views
             WHERE record_id = ?1
               AND (?2 IS NULL OR user_id <> ?2);",
            params![id, change.updated_by],
        )?;

        let record = require_record(&tx, id)?;
        tx.commit()?;
        Ok(record)
    }

    fn mark_viewed(&self, record_id: RecordId, user_id: UserId) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO record_views (record_id, user_id)
             VALUES (?1, ?2)
             ON CONFLICT (record_id, user_id)
             DO UPDATE SET viewed_at = (strftime('%s', 'now') * 1000);",
            params![record_id, user_id],
        )?;
        Ok(())
    }

    fn list_children(&self, parent_id: RecordId, module_id: ModuleId) -> RepoResult<Vec<Record>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS}
             FROM records r
             WHERE r.parent_record_id = ?1 AND r.module_id = ?2
             ORDER BY r.created_at DESC, r.id DESC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![parent_id, module_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }
        Ok(records)
    }

    fn count_children(&self, parent_id: RecordId) -> RepoResult<ChildrenCount> {
        let mut stmt = self.conn.prepare(
            "SELECT m.id, m.name, m.display_name, COUNT(r.id)
             FROM records r
             JOIN modules m ON m.id = r.module_id
             WHERE r.parent_record_id = ?1
             GROUP BY m.id, m.name, m.display_name
             ORDER BY m.display_name COLLATE NOCASE ASC, m.id ASC;",
        )?;
        let mut rows = stmt.query([parent_id])?;
        let mut breakdown = Vec::new();
        while let Some(row) = rows.next()? {
            breakdown.push(SubModuleCount {
                module_id: row.get(0)?,
                module_name: row.get(1)?,
                display_name: row.get(2)?,
                count: row.get(3)?,
            });
        }
        Ok(ChildrenCount {
            total_count: breakdown.iter().map(|entry| entry.count).sum(),
            breakdown,
        })
    }

    fn subtree_module_ids(&self, id: RecordId) -> RepoResult<Vec<ModuleId>> {
        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE subtree(id) AS (
                SELECT id FROM records WHERE id = ?1
                UNION ALL
                SELECT r.id FROM records r JOIN subtree s ON r.parent_record_id = s.id
            )
            SELECT DISTINCT r.module_id
            FROM records r JOIN subtree s ON r.id = s.id
            ORDER BY r.module_id ASC;",
        )?;
        let ids = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<Result<Vec<ModuleId>, _>>()?;
        Ok(ids)
    }

    fn delete_record(&self, id: RecordId, mode: RecordDeleteMode) -> RepoResult<RecordRemoval> {
        let tx = self.immediate()?;
        if find_record_on(&tx, id)?.is_none() {
            return Err(RepoError::not_found("record", id));
        }

        let child_ids = direct_child_ids(&tx, id)?;
        let mut orphaned_child_ids = Vec::new();
        let doomed = match mode {
            RecordDeleteMode::Restrict if !child_ids.is_empty() => {
                return Err(RepoError::Constraint(format!(
                    "record {id} still has {} child record(s)",
                    child_ids.len()
                )));
            }
            RecordDeleteMode::Restrict => vec![id],
            RecordDeleteMode::Orphan => {
                tx.execute(
                    "UPDATE records
                     SET parent_record_id = NULL,
                         updated_at = (strftime('%s', 'now') * 1000)
                     WHERE parent_record_id = ?1;",
                    [id],
                )?;
                orphaned_child_ids = child_ids;
                vec![id]
            }
            RecordDeleteMode::Cascade => subtree_ids_deepest_first(&tx, id)?,
        };

        let mut file_paths = Vec::new();
        for record_id in &doomed {
            file_paths.extend(attachment_paths(&tx, *record_id)?);
            tx.execute("DELETE FROM records WHERE id = ?1;", [record_id])?;
        }
        tx.commit()?;

        Ok(RecordRemoval {
            deleted: DeletedRecord {
                record_id: id,
                deleted_record_ids: doomed,
                orphaned_child_ids,
            },
            file_paths,
        })
    }
}

/// Normalizes list limit according to the record list contract.
pub fn normalize_record_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => RECORDS_DEFAULT_LIMIT,
        Some(value) if value > RECORDS_LIMIT_MAX => RECORDS_LIMIT_MAX,
        Some(value) => value,
    }
}

pub(crate) fn find_record_on(conn: &Connection, id: RecordId) -> RepoResult<Option<Record>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM records r WHERE r.id = ?1;");
    conn.query_row(&sql, [id], |row| Ok(parse_record_row(row)))
        .optional()?
        .transpose()
}

fn require_record(conn: &Connection, id: RecordId) -> RepoResult<Record> {
    find_record_on(conn, id)?.ok_or_else(|| RepoError::not_found("record", id))
}

fn direct_child_ids(conn: &Connection, id: RecordId) -> RepoResult<Vec<RecordId>> {
    let mut stmt =
        conn.prepare("SELECT id FROM records WHERE parent_record_id = ?1 ORDER BY id ASC;")?;
    let ids = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<Vec<RecordId>, _>>()?;
    Ok(ids)
}

fn subtree_ids_deepest_first(conn: &Connection, id: RecordId) -> RepoResult<Vec<RecordId>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE subtree(id, depth) AS (
            SELECT id, 0 FROM records WHERE id = ?1
            UNION ALL
            SELECT r.id, s.depth + 1
            FROM records r
            JOIN subtree s ON r.parent_record_id = s.id
        )
        SELECT id FROM subtree ORDER BY depth DESC, id DESC;",
    )?;
    let ids = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<Vec<RecordId>, _>>()?;
    Ok(ids)
}

fn attachment_paths(conn: &Connection, record_id: RecordId) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT file_path FROM record_images WHERE record_id = ?1
         UNION ALL
         SELECT file_path FROM record_documents WHERE record_id = ?1;",
    )?;
    let paths = stmt
        .query_map([record_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(paths)
}

fn parse_record_row(row: &Row<'_>) -> RepoResult<Record> {
    let raw_data: String = row.get(4)?;
    Ok(Record {
        id: row.get(0)?,
        module_id: row.get(1)?,
        name: row.get(2)?,
        status: row.get(3)?,
        data: parse_json_column(&raw_data, "records.data")?,
        parent_record_id: row.get(5)?,
        assigned_to: row.get(6)?,
        created_by: row.get(7)?,
        updated_by: row.get(8)?,
        version: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}
