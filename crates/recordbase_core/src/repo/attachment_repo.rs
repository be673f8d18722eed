//! Attachment persistence: ordered images, documents and record links.
//!
//! # Invariants
//! - Image and document mutations append their history entry in the same
//!   transaction.
//! - New images go to the end: `sort_order = max + 1`, or 0 for the first.
//! - Links are undirected; a pair is stored once regardless of direction.

use crate::model::attachment::{
    DocumentId, ImageId, LinkId, RecordDocument, RecordImage, RecordLink,
};
use crate::model::history::NewHistoryEntry;
use crate::model::principal::UserId;
use crate::model::record::RecordId;
use crate::repo::history_repo::insert_history;
use crate::repo::{RepoError, RepoResult, SqliteStore};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

const IMAGE_SELECT_SQL: &str = "SELECT
    id,
    record_id,
    file_path,
    mime_type,
    sort_order,
    created_at
FROM record_images";

const DOCUMENT_SELECT_SQL: &str = "SELECT
    id,
    record_id,
    file_path,
    file_name,
    mime_type,
    file_size,
    uploaded_by,
    created_at
FROM record_documents";

const LINK_SELECT_SQL: &str = "SELECT
    id,
    record_id,
    linked_record_id,
    note,
    created_by,
    created_at
FROM record_links";

/// Columns of a document about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    pub record_id: RecordId,
    pub file_path: String,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: i64,
    pub uploaded_by: Option<UserId>,
}

pub trait AttachmentRepository {
    /// Images ordered by `sort_order ASC, id ASC`.
    fn list_images(&self, record_id: RecordId) -> RepoResult<Vec<RecordImage>>;
    fn find_image(&self, id: ImageId) -> RepoResult<Option<RecordImage>>;
    fn insert_image(
        &self,
        record_id: RecordId,
        file_path: &str,
        mime_type: &str,
        added: &NewHistoryEntry,
    ) -> RepoResult<RecordImage>;
    /// Rewrites `sort_order` to each id's position in `ordered_ids`.
    ///
    /// `ordered_ids` must be exactly the record's image set.
    fn reorder_images(&self, record_id: RecordId, ordered_ids: &[ImageId]) -> RepoResult<()>;
    fn delete_image(&self, id: ImageId, deleted: &NewHistoryEntry) -> RepoResult<()>;

    fn list_documents(&self, record_id: RecordId) -> RepoResult<Vec<RecordDocument>>;
    fn find_document(&self, id: DocumentId) -> RepoResult<Option<RecordDocument>>;
    fn insert_document(
        &self,
        row: &DocumentRow,
        added: &NewHistoryEntry,
    ) -> RepoResult<RecordDocument>;
    fn delete_document(&self, id: DocumentId, deleted: &NewHistoryEntry) -> RepoResult<()>;

    /// Links touching `record_id` from either side, oldest first.
    fn list_links(&self, record_id: RecordId) -> RepoResult<Vec<RecordLink>>;
    fn find_link(&self, id: LinkId) -> RepoResult<Option<RecordLink>>;
    fn insert_link(
        &self,
        record_id: RecordId,
        linked_record_id: RecordId,
        note: Option<&str>,
        created_by: Option<UserId>,
    ) -> RepoResult<RecordLink>;
    fn delete_link(&self, id: LinkId) -> RepoResult<()>;
}

impl AttachmentRepository for SqliteStore<'_> {
    fn list_images(&self, record_id: RecordId) -> RepoResult<Vec<RecordImage>> {
        list_images_on(self.conn, record_id)
    }

    fn find_image(&self, id: ImageId) -> RepoResult<Option<RecordImage>> {
        let sql = format!("{IMAGE_SELECT_SQL} WHERE id = ?1;");
        Ok(self
            .conn
            .query_row(&sql, [id], parse_image_row)
            .optional()?)
    }

    fn insert_image(
        &self,
        record_id: RecordId,
        file_path: &str,
        mime_type: &str,
        added: &NewHistoryEntry,
    ) -> RepoResult<RecordImage> {
        let tx = self.immediate()?;
        let sort_order: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM record_images WHERE record_id = ?1;",
            [record_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO record_images (record_id, file_path, mime_type, sort_order)
             VALUES (?1, ?2, ?3, ?4);",
            params![record_id, file_path, mime_type, sort_order],
        )?;
        let id = tx.last_insert_rowid();
        insert_history(&tx, record_id, added)?;
        let sql = format!("{IMAGE_SELECT_SQL} WHERE id = ?1;");
        let image = tx.query_row(&sql, [id], parse_image_row)?;
        tx.commit()?;
        Ok(image)
    }

    fn reorder_images(&self, record_id: RecordId, ordered_ids: &[ImageId]) -> RepoResult<()> {
        let tx = self.immediate()?;
        let current: BTreeSet<ImageId> = list_images_on(&tx, record_id)?
            .into_iter()
            .map(|image| image.id)
            .collect();
        let requested: BTreeSet<ImageId> = ordered_ids.iter().copied().collect();
        if requested.len() != ordered_ids.len() || requested != current {
            return Err(RepoError::Constraint(format!(
                "image order must list each of the record's {} image(s) exactly once",
                current.len()
            )));
        }

        for (position, image_id) in ordered_ids.iter().enumerate() {
            tx.execute(
                "UPDATE record_images SET sort_order = ?3 WHERE id = ?1 AND record_id = ?2;",
                params![image_id, record_id, position as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_image(&self, id: ImageId, deleted: &NewHistoryEntry) -> RepoResult<()> {
        let tx = self.immediate()?;
        let record_id: Option<RecordId> = tx
            .query_row(
                "SELECT record_id FROM record_images WHERE id = ?1;",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        let record_id = record_id.ok_or_else(|| RepoError::not_found("image", id))?;
        tx.execute("DELETE FROM record_images WHERE id = ?1;", [id])?;
        insert_history(&tx, record_id, deleted)?;
        tx.commit()?;
        Ok(())
    }

    fn list_documents(&self, record_id: RecordId) -> RepoResult<Vec<RecordDocument>> {
        let sql = format!("{DOCUMENT_SELECT_SQL} WHERE record_id = ?1 ORDER BY id ASC;");
        let mut stmt = self.conn.prepare(&sql)?;
        let documents = stmt
            .query_map([record_id], parse_document_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }

    fn find_document(&self, id: DocumentId) -> RepoResult<Option<RecordDocument>> {
        let sql = format!("{DOCUMENT_SELECT_SQL} WHERE id = ?1;");
        Ok(self
            .conn
            .query_row(&sql, [id], parse_document_row)
            .optional()?)
    }

    fn insert_document(
        &self,
        row: &DocumentRow,
        added: &NewHistoryEntry,
    ) -> RepoResult<RecordDocument> {
        let tx = self.immediate()?;
        tx.execute(
            "INSERT INTO record_documents (
                record_id,
                file_path,
                file_name,
                mime_type,
                file_size,
                uploaded_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                row.record_id,
                row.file_path.as_str(),
                row.file_name.as_str(),
                row.mime_type.as_str(),
                row.file_size,
                row.uploaded_by,
            ],
        )?;
        let id = tx.last_insert_rowid();
        insert_history(&tx, row.record_id, added)?;
        let sql = format!("{DOCUMENT_SELECT_SQL} WHERE id = ?1;");
        let document = tx.query_row(&sql, [id], parse_document_row)?;
        tx.commit()?;
        Ok(document)
    }

    fn delete_document(&self, id: DocumentId, deleted: &NewHistoryEntry) -> RepoResult<()> {
        let tx = self.immediate()?;
        let record_id: Option<RecordId> = tx
            .query_row(
                "SELECT record_id FROM record_documents WHERE id = ?1;",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        let record_id = record_id.ok_or_else(|| RepoError::not_found("document", id))?;
        tx.execute("DELETE FROM record_documents WHERE id = ?1;", [id])?;
        insert_history(&tx, record_id, deleted)?;
        tx.commit()?;
        Ok(())
    }

    fn list_links(&self, record_id: RecordId) -> RepoResult<Vec<RecordLink>> {
        let sql = format!(
            "{LINK_SELECT_SQL}
             WHERE record_id = ?1 OR linked_record_id = ?1
             ORDER BY created_at ASC, id ASC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let links = stmt
            .query_map([record_id], parse_link_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn find_link(&self, id: LinkId) -> RepoResult<Option<RecordLink>> {
        let sql = format!("{LINK_SELECT_SQL} WHERE id = ?1;");
        Ok(self.conn.query_row(&sql, [id], parse_link_row).optional()?)
    }

    fn insert_link(
        &self,
        record_id: RecordId,
        linked_record_id: RecordId,
        note: Option<&str>,
        created_by: Option<UserId>,
    ) -> RepoResult<RecordLink> {
        let existing: Option<LinkId> = self
            .conn
            .query_row(
                "SELECT id FROM record_links
                 WHERE (record_id = ?1 AND linked_record_id = ?2)
                    OR (record_id = ?2 AND linked_record_id = ?1);",
                params![record_id, linked_record_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(existing) = existing {
            return Err(RepoError::Constraint(format!(
                "records {record_id} and {linked_record_id} are already linked (link {existing})"
            )));
        }

        self.conn.execute(
            "INSERT INTO record_links (record_id, linked_record_id, note, created_by)
             VALUES (?1, ?2, ?3, ?4);",
            params![record_id, linked_record_id, note, created_by],
        )?;
        let id = self.conn.last_insert_rowid();
        self.find_link(id)?
            .ok_or_else(|| RepoError::not_found("link", id))
    }

    fn delete_link(&self, id: LinkId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM record_links WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("link", id));
        }
        Ok(())
    }
}

pub(crate) fn list_images_on(conn: &Connection, record_id: RecordId) -> RepoResult<Vec<RecordImage>> {
    let sql = format!("{IMAGE_SELECT_SQL} WHERE record_id = ?1 ORDER BY sort_order ASC, id ASC;");
    let mut stmt = conn.prepare(&sql)?;
    let images = stmt
        .query_map([record_id], parse_image_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(images)
}

fn parse_image_row(row: &Row<'_>) -> rusqlite::Result<RecordImage> {
    Ok(RecordImage {
        id: row.get(0)?,
        record_id: row.get(1)?,
        file_path: row.get(2)?,
        mime_type: row.get(3)?,
        sort_order: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn parse_document_row(row: &Row<'_>) -> rusqlite::Result<RecordDocument> {
    Ok(RecordDocument {
        id: row.get(0)?,
        record_id: row.get(1)?,
        file_path: row.get(2)?,
        file_name: row.get(3)?,
        mime_type: row.get(4)?,
        file_size: row.get(5)?,
        uploaded_by: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn parse_link_row(row: &Row<'_>) -> rusqlite::Result<RecordLink> {
    Ok(RecordLink {
        id: row.get(0)?,
        record_id: row.get(1)?,
        linked_record_id: row.get(2)?,
        note: row.get(3)?,
        created_by: row.get(4)?,
        created_at: row.get(5)?,
    })
}
