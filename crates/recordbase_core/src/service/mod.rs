//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Enforce access decisions before any record-level read or write.
//! - Keep HTTP and other outer layers decoupled from storage details.
//!
//! # Invariants
//! - Best-effort side effects (view markers, notifications, file cleanup)
//!   never fail a call; they surface as `Outcome::partial_failures`.

pub mod access_service;
pub mod attachment_service;
pub mod audit_service;
pub mod permission_cache;
pub mod record_service;
pub mod schema_service;

use crate::model::principal::Principal;
use crate::notify::NotificationHub;
use crate::repo::{RepoError, SqliteStore};
use crate::storage::{FileStore, FileStoreError};
use access_service::AccessService;
use attachment_service::AttachmentService;
use audit_service::AuditService;
use permission_cache::PermissionCache;
use record_service::RecordService;
use rusqlite::Connection;
use schema_service::SchemaService;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error taxonomy shared by every service.
#[derive(Debug)]
pub enum ServiceError {
    /// No principal was supplied.
    Unauthenticated,
    Forbidden(String),
    NotFound(String),
    /// Caller input violates schema or structural rules.
    Validation(String),
    /// Optimistic concurrency check failed.
    Conflict(String),
    Storage(RepoError),
    File(FileStoreError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "authentication required"),
            Self::Forbidden(message) => write!(f, "forbidden: {message}"),
            Self::NotFound(message) => write!(f, "{message}"),
            Self::Validation(message) => write!(f, "{message}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::File(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::File(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { .. } => Self::NotFound(value.to_string()),
            RepoError::Constraint(message) => Self::Validation(message),
            RepoError::VersionMismatch { .. } => Self::Conflict(value.to_string()),
            other => Self::Storage(other),
        }
    }
}

impl From<FileStoreError> for ServiceError {
    fn from(value: FileStoreError) -> Self {
        match value {
            FileStoreError::NotFound(_) => Self::NotFound(value.to_string()),
            FileStoreError::InvalidPath(_) => Self::Validation(value.to_string()),
            other => Self::File(other),
        }
    }
}

impl ServiceError {
    pub(crate) fn not_found(entity: &str, key: impl Display) -> Self {
        Self::NotFound(format!("{entity} not found: {key}"))
    }
}

/// Successful result plus best-effort side effects that did not happen.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub partial_failures: Vec<String>,
}

impl<T> Outcome<T> {
    pub fn complete(value: T) -> Self {
        Self {
            value,
            partial_failures: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.partial_failures.is_empty()
    }
}

/// Returns the principal or `Unauthenticated`.
pub(crate) fn require_principal(principal: Option<&Principal>) -> ServiceResult<&Principal> {
    principal.ok_or(ServiceError::Unauthenticated)
}

/// Returns the principal if it is an admin.
pub(crate) fn require_admin(principal: Option<&Principal>) -> ServiceResult<&Principal> {
    let principal = require_principal(principal)?;
    if !principal.is_admin() {
        return Err(ServiceError::Forbidden(
            "administrator role required".to_string(),
        ));
    }
    Ok(principal)
}

/// Every service over one SQLite connection and the process-wide collaborators.
pub struct Services<'a> {
    store: SqliteStore<'a>,
    cache: &'a PermissionCache,
    hub: &'a NotificationHub,
    files: &'a dyn FileStore,
}

impl<'a> Services<'a> {
    pub fn new(
        conn: &'a Connection,
        cache: &'a PermissionCache,
        hub: &'a NotificationHub,
        files: &'a dyn FileStore,
    ) -> Self {
        Self {
            store: SqliteStore::new(conn),
            cache,
            hub,
            files,
        }
    }

    pub fn schema(&self) -> SchemaService<'_, SqliteStore<'a>> {
        SchemaService::new(&self.store, self.cache)
    }

    pub fn access(&self) -> AccessService<'_, SqliteStore<'a>> {
        AccessService::new(&self.store, self.cache)
    }

    pub fn records(&self) -> RecordService<'_, SqliteStore<'a>> {
        RecordService::new(&self.store, self.cache, self.hub, self.files)
    }

    pub fn attachments(&self) -> AttachmentService<'_, SqliteStore<'a>> {
        AttachmentService::new(&self.store, self.cache, self.files)
    }

    pub fn audit(&self) -> AuditService<'_, SqliteStore<'a>> {
        AuditService::new(&self.store, self.cache)
    }
}
