//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts per concern.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Writes that must land together (record + history, attachment + history)
//!   run inside one `IMMEDIATE` transaction.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Constraint and trigger violations surface as `RepoError::Constraint`.

pub mod access_repo;
pub mod attachment_repo;
pub mod history_repo;
pub mod record_repo;
pub mod schema_repo;

use crate::db::DbError;
use crate::model::record::RecordId;
use access_repo::AccessRepository;
use attachment_repo::AttachmentRepository;
use history_repo::HistoryRepository;
use record_repo::RecordRepository;
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use schema_repo::SchemaRepository;
use serde::de::DeserializeOwned;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Shared repository error for every persistence concern.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Row addressed by id or key does not exist.
    NotFound { entity: &'static str, key: String },
    /// Unique, check, foreign-key or trigger violation.
    Constraint(String),
    /// Optimistic concurrency guard failed.
    VersionMismatch {
        record_id: RecordId,
        expected: i64,
        actual: i64,
    },
    InvalidData(String),
}

impl RepoError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, key } => write!(f, "{entity} not found: {key}"),
            Self::Constraint(message) => write!(f, "constraint violated: {message}"),
            Self::VersionMismatch {
                record_id,
                expected,
                actual,
            } => write!(
                f,
                "record {record_id} is at version {actual}, expected {expected}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match &value {
            rusqlite::Error::SqliteFailure(err, message)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Self::Constraint(
                    message
                        .clone()
                        .unwrap_or_else(|| "constraint violation".to_string()),
                )
            }
            _ => Self::Db(DbError::Sqlite(value)),
        }
    }
}

/// Every persistence concern the services need, over one backend.
pub trait Store:
    SchemaRepository + RecordRepository + HistoryRepository + AttachmentRepository + AccessRepository
{
}

impl<T> Store for T where
    T: SchemaRepository
        + RecordRepository
        + HistoryRepository
        + AttachmentRepository
        + AccessRepository
{
}

/// SQLite-backed store over one migrated connection.
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Starts an `IMMEDIATE` transaction on the shared connection.
    ///
    /// The connection is borrowed immutably by every repository, so nested
    /// transactions are a caller bug and surface as SQLite errors.
    pub(crate) fn immediate(&self) -> RepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

pub(crate) fn int_to_bool(value: i64) -> bool {
    value != 0
}

/// Decodes a JSON text column, naming the column in the error.
pub(crate) fn parse_json_column<T: DeserializeOwned>(raw: &str, column: &str) -> RepoResult<T> {
    serde_json::from_str(raw)
        .map_err(|err| RepoError::InvalidData(format!("column `{column}` holds invalid json: {err}")))
}

pub(crate) fn to_json_column<T: serde::Serialize>(value: &T, column: &str) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("column `{column}` cannot be encoded: {err}")))
}

#[cfg(test)]
mod tests {
    use super::RepoError;
    use crate::db::open_db_in_memory;

    #[test]
    fn unique_violation_maps_to_constraint() {
        let conn = open_db_in_memory().unwrap();
        conn.execute(
            "INSERT INTO modules (name, display_name) VALUES ('tickets', 'Tickets');",
            [],
        )
        .unwrap();
        let err: RepoError = conn
            .execute(
                "INSERT INTO modules (name, display_name) VALUES ('tickets', 'Again');",
                [],
            )
            .unwrap_err()
            .into();
        assert!(matches!(err, RepoError::Constraint(_)));
    }

    #[test]
    fn immutable_module_name_trigger_maps_to_constraint() {
        let conn = open_db_in_memory().unwrap();
        conn.execute(
            "INSERT INTO modules (name, display_name) VALUES ('tickets', 'Tickets');",
            [],
        )
        .unwrap();
        let err: RepoError = conn
            .execute("UPDATE modules SET name = 'issues' WHERE name = 'tickets';", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, RepoError::Constraint(_)));
    }
}
