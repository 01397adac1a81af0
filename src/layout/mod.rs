//! Layout Persistence
//!
//! The tree is saved as a JSON snapshot and restored on launch. Loading is
//! forgiving: a missing or corrupt layout yields an empty snapshot and the
//! desktop is rediscovered from scratch.

pub mod io;
pub mod scheduler;

pub use scheduler::SaveScheduler;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{ItemRecord, LayoutSnapshot};
use io::{locked_write, WriteError};

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Failed to read layout {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize layout: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Where snapshots live
pub trait LayoutStore: Send + Sync {
    fn save(&self, snapshot: &LayoutSnapshot) -> Result<(), LayoutError>;

    /// Stored snapshot; empty when nothing usable is stored
    fn load(&self) -> Result<LayoutSnapshot, LayoutError>;
}

/// Current snapshots and the bare item arrays of older layout files
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredLayout {
    Snapshot(LayoutSnapshot),
    Legacy(Vec<ItemRecord>),
}

/// Snapshot stored as a JSON file
#[derive(Debug, Clone)]
pub struct JsonLayoutStore {
    path: PathBuf,
}

impl JsonLayoutStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/smart-desktop/layout.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("smart-desktop").join("layout.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LayoutStore for JsonLayoutStore {
    fn save(&self, snapshot: &LayoutSnapshot) -> Result<(), LayoutError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        locked_write(&self.path, &json)?;
        tracing::debug!(
            path = %self.path.display(),
            items = snapshot.items.len(),
            "Saved layout"
        );
        Ok(())
    }

    fn load(&self) -> Result<LayoutSnapshot, LayoutError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No saved layout");
            return Ok(LayoutSnapshot::default());
        }

        let raw = std::fs::read(&self.path).map_err(|source| LayoutError::Read {
            path: self.path.display().to_string(),
            source,
        })?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(LayoutSnapshot::default());
        }

        match serde_json::from_slice::<StoredLayout>(&raw) {
            Ok(StoredLayout::Snapshot(snapshot)) => Ok(snapshot),
            Ok(StoredLayout::Legacy(records)) => {
                tracing::info!(path = %self.path.display(), items = records.len(), "Read legacy layout file");
                Ok(LayoutSnapshot::from_records(records))
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring corrupt layout file");
                Ok(LayoutSnapshot::default())
            }
        }
    }
}
