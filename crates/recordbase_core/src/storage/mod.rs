//! Attachment file storage.
//!
//! # Responsibility
//! - Abstract byte storage for uploaded images and documents.
//! - Keep upload-root-relative path rules in one place.
//!
//! # Invariants
//! - Paths handed to a store are relative, `/`-separated and never escape
//!   the store root.

mod local;

pub use local::LocalFileStore;

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

pub type FileStoreResult<T> = Result<T, FileStoreError>;

/// Storage backend for attachment bytes.
pub trait FileStore: Send + Sync {
    fn write(&self, path: &str, bytes: &[u8]) -> FileStoreResult<()>;
    fn read(&self, path: &str) -> FileStoreResult<Vec<u8>>;
    /// Removes one file. Returns `false` when it was already gone.
    fn delete(&self, path: &str) -> FileStoreResult<bool>;
}

#[derive(Debug)]
pub enum FileStoreError {
    /// Path is absolute, empty, or walks out of the root.
    InvalidPath(String),
    NotFound(String),
    Io { path: String, source: io::Error },
}

impl Display for FileStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath(path) => write!(f, "invalid storage path `{path}`"),
            Self::NotFound(path) => write!(f, "stored file not found: {path}"),
            Self::Io { path, source } => write!(f, "storage io failed for `{path}`: {source}"),
        }
    }
}

impl Error for FileStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Checks that `path` is a safe store-relative path.
pub fn validate_relative_path(path: &str) -> FileStoreResult<()> {
    let invalid = || FileStoreError::InvalidPath(path.to_string());
    if path.is_empty() || path.starts_with('/') || path.contains('\\') || path.contains('\0') {
        return Err(invalid());
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(invalid());
        }
        // Windows drive prefixes such as `C:`.
        if segment.contains(':') {
            return Err(invalid());
        }
    }
    Ok(())
}
