//! Crash-safe file writes
//!
//! Data goes to a temporary sibling first, is fsynced, then renamed over the
//! target, and the directory is synced so the rename survives a crash. A
//! reader therefore sees either the old file or the new one, never a torn
//! write.

use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Cannot determine parent directory for {0}")]
    NoParent(String),

    #[error("Failed to {op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl WriteError {
    fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        WriteError::Io {
            op,
            path: path.display().to_string(),
            source,
        }
    }
}

/// Write `data` to `path` atomically, creating parent directories
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), WriteError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| WriteError::NoParent(path.display().to_string()))?;

    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| WriteError::io("create directory", parent, e))?;
    }

    let temp_path = temp_sibling(parent, path);

    let written = (|| -> Result<(), WriteError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| WriteError::io("create", &temp_path, e))?;
        file.write_all(data)
            .map_err(|e| WriteError::io("write", &temp_path, e))?;
        file.sync_all().map_err(|e| WriteError::io("sync", &temp_path, e))
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(WriteError::io("rename into", path, e));
    }

    sync_directory(parent)
}

/// Same as [`atomic_write`], holding an exclusive lock on `<path>.lock`
///
/// Serializes writers across processes sharing one layout file.
pub fn locked_write(path: &Path, data: &[u8]) -> Result<(), WriteError> {
    let lock_path = lock_path(path);
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).map_err(|e| WriteError::io("create directory", parent, e))?;
    }

    let lock = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| WriteError::io("open", &lock_path, e))?;
    lock.lock_exclusive()
        .map_err(|e| WriteError::io("lock", &lock_path, e))?;

    let result = atomic_write(path, data);

    if let Err(e) = FileExt::unlock(&lock) {
        tracing::warn!(path = %lock_path.display(), error = %e, "Failed to release layout lock");
    }
    result
}

pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

fn temp_sibling(parent: &Path, path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    parent.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

/// Make a rename inside `path` durable
pub fn sync_directory(path: &Path) -> Result<(), WriteError> {
    #[cfg(unix)]
    {
        let dir = fs::File::open(path).map_err(|e| WriteError::io("open directory", path, e))?;
        dir.sync_all()
            .map_err(|e| WriteError::io("sync directory", path, e))?;
    }

    // NTFS renames are already atomic
    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("layout.json");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sub").join("dir").join("layout.json");

        atomic_write(&path, b"nested").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_locked_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("layout.json");

        locked_write(&path, b"{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert!(lock_path(&path).exists());
        assert_eq!(lock_path(&path).file_name().unwrap(), "layout.json.lock");
    }
}
