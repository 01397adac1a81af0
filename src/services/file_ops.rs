//! Physical file moves
//!
//! Only the shell integration calls this. Grouping on the desktop never
//! touches files on disk.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileOpError {
    #[error("Destination does not exist: {}", .0.display())]
    DestinationMissing(PathBuf),

    #[error("Access denied to destination: {}", .0.display())]
    AccessDenied(PathBuf),

    #[error("Cannot move {}: {} is inside it", .dir.display(), .target.display())]
    Cycle { dir: PathBuf, target: PathBuf },

    #[error("Failed to move {} to {}: {error}", .from.display(), .to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        error: std::io::Error,
    },
}

/// Whether new entries can be created in `dir`
pub fn has_write_access(dir: &Path) -> bool {
    match fs::metadata(dir) {
        Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
        Err(_) => false,
    }
}

/// Refuse moving a directory into itself or one of its descendants
fn check_cycle(source: &Path, destination: &Path) -> Result<(), FileOpError> {
    let (Ok(source_canonical), Ok(target_canonical)) = (source.canonicalize(), destination.canonicalize()) else {
        return Ok(());
    };

    if target_canonical.starts_with(&source_canonical) {
        return Err(FileOpError::Cycle {
            dir: source.to_path_buf(),
            target: destination.to_path_buf(),
        });
    }
    Ok(())
}

/// Move every existing path into `destination`, keeping file names
///
/// Returns how many entries were moved. Stops at the first failing move.
pub fn move_files(paths: &[PathBuf], destination: &Path) -> Result<usize, FileOpError> {
    if !destination.exists() {
        return Err(FileOpError::DestinationMissing(destination.to_path_buf()));
    }
    if !has_write_access(destination) {
        return Err(FileOpError::AccessDenied(destination.to_path_buf()));
    }

    let mut moved = 0;
    for source in paths {
        if fs::symlink_metadata(source).is_err() {
            tracing::debug!(path = %source.display(), "Skipping missing file");
            continue;
        }
        let Some(name) = source.file_name() else {
            continue;
        };
        if source.is_dir() {
            check_cycle(source, destination)?;
        }

        let target = destination.join(name);
        fs::rename(source, &target).map_err(|error| FileOpError::Move {
            from: source.clone(),
            to: target.clone(),
            error,
        })?;
        tracing::info!(from = %source.display(), to = %target.display(), "Moved file");
        moved += 1;
    }

    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moves_existing_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dest");
        fs::create_dir(&dest).unwrap();

        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        let moved = move_files(&[a.clone(), dir.path().join("ghost.txt"), b], &dest).unwrap();
        assert_eq!(moved, 2);
        assert!(dest.join("a.txt").exists());
        assert!(dest.join("b.txt").exists());
        assert!(!a.exists());
    }

    #[test]
    fn test_many_files() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dest");
        fs::create_dir(&dest).unwrap();

        let files: Vec<PathBuf> = (0..500)
            .map(|i| {
                let path = dir.path().join(format!("file{}.txt", i));
                fs::write(&path, "x").unwrap();
                path
            })
            .collect();

        assert_eq!(move_files(&files, &dest).unwrap(), 500);
    }

    #[test]
    fn test_missing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let result = move_files(&[], &dir.path().join("nope"));
        assert!(matches!(result, Err(FileOpError::DestinationMissing(_))));
    }

    #[test]
    fn test_directory_into_own_descendant_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("parent");
        let child = parent.join("child");
        fs::create_dir_all(&child).unwrap();

        let result = move_files(&[parent.clone()], &child);
        assert!(matches!(result, Err(FileOpError::Cycle { .. })));
        assert!(parent.exists());

        let result = move_files(&[parent.clone()], &parent);
        assert!(matches!(result, Err(FileOpError::Cycle { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_destination() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("locked");
        fs::create_dir(&dest).unwrap();
        fs::set_permissions(&dest, fs::Permissions::from_mode(0o555)).unwrap();

        let result = move_files(&[], &dest);
        assert!(matches!(result, Err(FileOpError::AccessDenied(_))));

        fs::set_permissions(&dest, fs::Permissions::from_mode(0o755)).unwrap();
    }
}
