//! Settings persistence
//!
//! `settings.json` lives in the platform config directory. A missing file
//! means defaults; an unreadable one is logged and replaced by defaults so
//! the app always starts.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::layout::io::{atomic_write, WriteError};
use crate::models::AppSettings;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Could not determine the config directory")]
    NoConfigDir,

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// `<config_dir>/smart-desktop/settings.json`
pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    dirs::config_dir()
        .map(|d| d.join("smart-desktop").join("settings.json"))
        .ok_or(SettingsError::NoConfigDir)
}

pub fn load_settings(path: &Path) -> AppSettings {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AppSettings::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read settings, using defaults");
            return AppSettings::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Invalid settings file, using defaults");
            AppSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<(), SettingsError> {
    let json = serde_json::to_vec_pretty(settings)?;
    atomic_write(path, &json)?;
    tracing::debug!(path = %path.display(), "Saved settings");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_settings(&dir.path().join("settings.json")), AppSettings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = AppSettings::default();
        settings.folders.allow_nested_folders = true;
        settings.general.undo_stack_depth = 30;
        save_settings(&path, &settings).unwrap();

        assert_eq!(load_settings(&path), settings);
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "[not settings").unwrap();
        assert_eq!(load_settings(&path), AppSettings::default());
    }
}
