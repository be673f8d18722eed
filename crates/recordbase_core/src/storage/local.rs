//! Local filesystem file store.

use crate::storage::{validate_relative_path, FileStore, FileStoreError, FileStoreResult};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File store rooted at one directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> FileStoreResult<PathBuf> {
        validate_relative_path(path)?;
        Ok(path
            .split('/')
            .fold(self.root.clone(), |acc, segment| acc.join(segment)))
    }
}

impl FileStore for LocalFileStore {
    /// Writes through a temp file and rename so readers never see partial files.
    fn write(&self, path: &str, bytes: &[u8]) -> FileStoreResult<()> {
        let full_path = self.full_path(path)?;
        let io_err = |source: io::Error| FileStoreError::Io {
            path: path.to_string(),
            source,
        };

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let temp_path = full_path.with_file_name(format!(
            ".{}.tmp",
            Uuid::new_v4().simple()
        ));
        let written = fs::File::create(&temp_path).and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        });
        if let Err(err) = written.and_then(|_| fs::rename(&temp_path, &full_path)) {
            let _ = fs::remove_file(&temp_path);
            log::warn!(
                "event=file_write module=storage status=error path={} error={}",
                path,
                err
            );
            return Err(io_err(err));
        }

        log::debug!(
            "event=file_write module=storage status=ok path={} bytes={}",
            path,
            bytes.len()
        );
        Ok(())
    }

    fn read(&self, path: &str) -> FileStoreResult<Vec<u8>> {
        let full_path = self.full_path(path)?;
        fs::read(&full_path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => FileStoreError::NotFound(path.to_string()),
            _ => FileStoreError::Io {
                path: path.to_string(),
                source,
            },
        })
    }

    fn delete(&self, path: &str) -> FileStoreResult<bool> {
        let full_path = self.full_path(path)?;
        match fs::remove_file(&full_path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(FileStoreError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LocalFileStore;
    use crate::storage::{FileStore, FileStoreError};

    #[test]
    fn write_read_delete_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store.write("tickets/1/a.txt", b"hello").unwrap();
        assert_eq!(store.read("tickets/1/a.txt").unwrap(), b"hello");
        assert!(dir.path().join("tickets").join("1").join("a.txt").exists());

        assert!(store.delete("tickets/1/a.txt").unwrap());
        assert!(!store.delete("tickets/1/a.txt").unwrap());
        assert!(matches!(
            store.read("tickets/1/a.txt"),
            Err(FileStoreError::NotFound(_))
        ));
    }

    #[test]
    fn leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        store.write("docs/report.pdf", b"%PDF").unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("docs"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["report.pdf".to_string()]);
    }

    #[test]
    fn rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        assert!(matches!(
            store.write("../escape.txt", b"x"),
            Err(FileStoreError::InvalidPath(_))
        ));
    }
}
