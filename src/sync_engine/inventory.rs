//! Local side of the reconciliation: which items already exist on disk, and
//! how new ones are written.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use walkdir::WalkDir;

use crate::path_validation::validate_item_filename;
use crate::remote::{ContentStream, RemoteError};
use crate::sync_engine::types::SyncFailureKind;

/// Prefix of in-flight download files; never a valid inventory entry.
const PARTIAL_PREFIX: &str = ".photosync-";

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to create folder {path}: {source}")]
    CreateFolder {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid filename {name:?}: {reason}")]
    InvalidFilename { name: String, reason: String },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("download interrupted: {0}")]
    Stream(#[from] RemoteError),
}

impl InventoryError {
    pub fn failure_kind(&self) -> SyncFailureKind {
        match self {
            InventoryError::Stream(_) => SyncFailureKind::Network,
            _ => SyncFailureKind::Filesystem,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(u64),
    /// The worker was superseded before the file was committed.
    Abandoned,
}

/// True iff a file with exactly this name exists in the album folder.
pub fn is_present(album_folder: &Path, filename: &str) -> bool {
    album_folder.join(filename).is_file()
}

/// Create the album folder if it doesn't exist yet.
pub fn ensure_folder(path: &Path) -> Result<(), InventoryError> {
    std::fs::create_dir_all(path).map_err(|source| InventoryError::CreateFolder {
        path: path.to_path_buf(),
        source,
    })
}

/// Names of the files already in one album folder.
#[derive(Debug, Default)]
pub struct LocalInventory {
    names: HashSet<String>,
}

impl LocalInventory {
    /// Read the album folder once. A missing folder is an empty inventory.
    ///
    /// An entry counts when [`is_present`] would say so, which includes
    /// symlinks to files.
    pub fn scan(album_folder: &Path) -> Self {
        let names = WalkDir::new(album_folder)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| !name.starts_with(PARTIAL_PREFIX))
            .collect();

        Self { names }
    }

    pub fn is_present(&self, filename: &str) -> bool {
        self.names.contains(filename)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Stream `content` into `album_folder/filename`.
    ///
    /// Bytes go to a temp file in the same folder that is renamed into place
    /// only after the whole stream arrived, so an interrupted download never
    /// shows up as present. `still_current` is checked right before the rename.
    pub async fn write_item<F>(
        &mut self,
        album_folder: &Path,
        filename: &str,
        mut content: ContentStream,
        created_at: Option<DateTime<Utc>>,
        still_current: F,
    ) -> Result<WriteOutcome, InventoryError>
    where
        F: Fn() -> bool,
    {
        validate_item_filename(filename).map_err(|reason| InventoryError::InvalidFilename {
            name: filename.to_string(),
            reason,
        })?;

        let target = album_folder.join(filename);
        let write_err = |source| InventoryError::Write {
            path: target.clone(),
            source,
        };

        let tmp = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .suffix(".part")
            .tempfile_in(album_folder)
            .map_err(write_err)?;
        let (std_file, tmp_path) = tmp.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut written = 0u64;
        while let Some(chunk) = content.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;
        drop(file);

        if !still_current() {
            return Ok(WriteOutcome::Abandoned);
        }

        tmp_path
            .persist(&target)
            .map_err(|e| write_err(e.error))?;

        if let Some(created_at) = created_at {
            let mtime = filetime::FileTime::from_unix_time(
                created_at.timestamp(),
                created_at.timestamp_subsec_nanos(),
            );
            if let Err(e) = filetime::set_file_mtime(&target, mtime) {
                warn!("failed to set mtime on {}: {e}", target.display());
            }
        }

        self.names.insert(filename.to_string());
        Ok(WriteOutcome::Written(written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn stream_of(chunks: Vec<Result<Bytes, RemoteError>>) -> ContentStream {
        Box::pin(futures::stream::iter(chunks))
    }

    #[test]
    fn test_is_present_exact_name() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("p1.jpg"), b"x").unwrap();

        assert!(is_present(dir.path(), "p1.jpg"));
        assert!(!is_present(dir.path(), "p2.jpg"));
        assert!(!is_present(&dir.path().join("missing"), "p1.jpg"));
    }

    #[test]
    fn test_scan_ignores_dirs_and_partials() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("p1.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join(".photosync-abc.part"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("p2.jpg")).unwrap();
        std::fs::write(dir.path().join("p2.jpg").join("nested.jpg"), b"x").unwrap();

        let inventory = LocalInventory::scan(dir.path());
        assert_eq!(inventory.len(), 1);
        assert!(inventory.is_present("p1.jpg"));
        assert!(!inventory.is_present("p2.jpg"));
        assert!(!inventory.is_present("nested.jpg"));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_counts_symlinked_files_like_is_present() {
        let dir = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        std::fs::write(elsewhere.path().join("original.jpg"), b"x").unwrap();
        std::os::unix::fs::symlink(elsewhere.path().join("original.jpg"), dir.path().join("p1.jpg")).unwrap();
        std::os::unix::fs::symlink(elsewhere.path(), dir.path().join("linked-dir")).unwrap();
        std::os::unix::fs::symlink(elsewhere.path().join("gone.jpg"), dir.path().join("dangling.jpg")).unwrap();

        let inventory = LocalInventory::scan(dir.path());
        for name in ["p1.jpg", "linked-dir", "dangling.jpg"] {
            assert_eq!(inventory.is_present(name), is_present(dir.path(), name), "{name}");
        }
        assert!(inventory.is_present("p1.jpg"));
        assert_eq!(inventory.len(), 1);
    }

    #[test]
    fn test_scan_missing_folder_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(LocalInventory::scan(&dir.path().join("nope")).is_empty());
    }

    #[test]
    fn test_ensure_folder_fails_under_a_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        assert!(ensure_folder(&dir.path().join("a").join("b")).is_ok());
        let err = ensure_folder(&file.join("album")).unwrap_err();
        assert_eq!(err.failure_kind(), SyncFailureKind::Filesystem);
    }

    #[tokio::test]
    async fn test_write_item_commits_complete_stream() {
        let dir = TempDir::new().unwrap();
        let mut inventory = LocalInventory::scan(dir.path());
        let created = "2023-07-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let outcome = inventory
            .write_item(
                dir.path(),
                "p1.jpg",
                stream_of(vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"world"))]),
                Some(created),
                || true,
            )
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Written(11));
        assert!(inventory.is_present("p1.jpg"));
        let path = dir.path().join("p1.jpg");
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");

        let mtime = filetime::FileTime::from_last_modification_time(&std::fs::metadata(&path).unwrap());
        assert_eq!(mtime.unix_seconds(), created.timestamp());
    }

    #[tokio::test]
    async fn test_interrupted_stream_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let mut inventory = LocalInventory::default();

        let err = inventory
            .write_item(
                dir.path(),
                "p1.jpg",
                stream_of(vec![
                    Ok(Bytes::from_static(b"half")),
                    Err(RemoteError::Network("connection reset".into())),
                ]),
                None,
                || true,
            )
            .await
            .unwrap_err();

        assert_eq!(err.failure_kind(), SyncFailureKind::Network);
        assert!(!is_present(dir.path(), "p1.jpg"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_superseded_write_is_abandoned() {
        let dir = TempDir::new().unwrap();
        let mut inventory = LocalInventory::default();

        let outcome = inventory
            .write_item(dir.path(), "p1.jpg", stream_of(vec![Ok(Bytes::from_static(b"x"))]), None, || false)
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Abandoned);
        assert!(!is_present(dir.path(), "p1.jpg"));
        assert!(!inventory.is_present("p1.jpg"));
    }

    #[tokio::test]
    async fn test_write_item_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let mut inventory = LocalInventory::default();

        let err = inventory
            .write_item(dir.path(), "../p1.jpg", stream_of(vec![]), None, || true)
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidFilename { .. }));
    }
}
