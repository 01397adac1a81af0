//! On-disk icon cache
//!
//! Resolved icons are kept as PNG files so the next launch skips native
//! lookups. File names hash the source path, the requested size and the
//! source's modification time, so a changed file misses automatically.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;

use super::resolver::IconImage;
use crate::layout::io::{atomic_write, WriteError};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to encode icon: {0}")]
    Encode(#[from] image::ImageError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("Failed to read icon cache {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub file_count: u64,
    pub total_bytes: u64,
    pub cache_dir: String,
}

#[derive(Debug, Clone)]
pub struct IconDiskCache {
    dir: PathBuf,
}

impl IconDiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<cache_dir>/smart-desktop/icons`
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("smart-desktop").join("icons"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, source: &Path, size: u32) -> Option<PathBuf> {
        let modified = fs::metadata(source).and_then(|m| m.modified()).ok()?;
        let mtime = modified.duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);

        let mut hasher = Sha256::new();
        hasher.update(source.to_string_lossy().as_bytes());
        hasher.update(size.to_le_bytes());
        hasher.update(mtime.to_le_bytes());
        Some(self.dir.join(format!("{:x}.png", hasher.finalize())))
    }

    /// Cached icon for `source` at `size`, if one is stored and readable
    pub fn load(&self, source: &Path, size: u32) -> Option<IconImage> {
        let entry = self.entry_path(source, size)?;
        if !entry.exists() {
            return None;
        }
        match image::open(&entry) {
            Ok(img) => Some(IconImage::new(img.to_rgba8(), size)),
            Err(e) => {
                tracing::debug!(path = %entry.display(), error = %e, "Dropping unreadable cached icon");
                let _ = fs::remove_file(&entry);
                None
            }
        }
    }

    pub fn store(&self, source: &Path, size: u32, icon: &IconImage) -> Result<(), CacheError> {
        let Some(entry) = self.entry_path(source, size) else {
            return Ok(());
        };
        let png = icon.to_png()?;
        atomic_write(&entry, &png)?;
        Ok(())
    }

    /// Delete every cached icon; returns the number of files removed
    pub fn clear(&self) -> Result<u64, CacheError> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in self.read_dir()? {
            if entry.path().extension().map(|e| e == "png").unwrap_or(false)
                && fs::remove_file(entry.path()).is_ok()
            {
                removed += 1;
            }
        }
        tracing::info!(removed, dir = %self.dir.display(), "Cleared icon cache");
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats {
            file_count: 0,
            total_bytes: 0,
            cache_dir: self.dir.display().to_string(),
        };
        if !self.dir.exists() {
            return Ok(stats);
        }

        for entry in self.read_dir()? {
            if let Ok(metadata) = entry.metadata() {
                if metadata.is_file() {
                    stats.file_count += 1;
                    stats.total_bytes += metadata.len();
                }
            }
        }
        Ok(stats)
    }

    fn read_dir(&self) -> Result<Vec<fs::DirEntry>, CacheError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.display().to_string(),
            source,
        })?;
        Ok(entries.filter_map(Result::ok).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn create_test_icon() -> IconImage {
        IconImage::new(RgbaImage::from_pixel(8, 8, image::Rgba([1, 2, 3, 255])), 8)
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        fs::write(&source, "hello").unwrap();
        let cache = IconDiskCache::new(dir.path().join("icons"));

        assert!(cache.load(&source, 8).is_none());
        cache.store(&source, 8, &create_test_icon()).unwrap();

        let loaded = cache.load(&source, 8).unwrap();
        assert_eq!(loaded.dimensions(), (8, 8));
        assert!(cache.load(&source, 16).is_none());
    }

    #[test]
    fn test_stats_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        fs::write(&source, "hello").unwrap();
        let cache = IconDiskCache::new(dir.path().join("icons"));

        cache.store(&source, 8, &create_test_icon()).unwrap();
        cache.store(&source, 16, &create_test_icon()).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.file_count, 2);
        assert!(stats.total_bytes > 0);

        assert_eq!(cache.clear().unwrap(), 2);
        assert_eq!(cache.stats().unwrap().file_count, 0);
    }

    #[test]
    fn test_missing_source_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IconDiskCache::new(dir.path().join("icons"));
        let ghost = dir.path().join("ghost.txt");

        cache.store(&ghost, 8, &create_test_icon()).unwrap();
        assert_eq!(cache.stats().unwrap().file_count, 0);
    }
}
