//! Application settings
//!
//! Persisted as camelCase JSON. Every field has a default so partial or
//! older settings files still load.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bounds for the undo history depth
pub const MIN_UNDO_DEPTH: usize = 5;
pub const MAX_UNDO_DEPTH: usize = 50;

/// Root settings model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub general: GeneralSettings,
    pub folders: FolderSettings,
    pub icons: IconSettings,
    pub paths: PathSettings,
    pub advanced: AdvancedSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneralSettings {
    /// Number of undo actions to keep
    pub undo_stack_depth: usize,
    /// Quiescence window before a layout save, in milliseconds
    pub save_debounce_ms: u64,
    /// Watch the desktop directory for new and removed entries
    pub watch_desktop: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            undo_stack_depth: 20,
            save_debounce_ms: 300,
            watch_desktop: true,
        }
    }
}

impl GeneralSettings {
    /// Undo depth clamped to the supported range
    pub fn undo_depth(&self) -> usize {
        self.undo_stack_depth.clamp(MIN_UNDO_DEPTH, MAX_UNDO_DEPTH)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderSettings {
    /// Name new folders from their content
    pub smart_naming_enabled: bool,
    /// Allow folders inside folders
    pub allow_nested_folders: bool,
    /// Display mode of newly created folders
    pub default_enlarged: bool,
}

impl Default for FolderSettings {
    fn default() -> Self {
        Self {
            smart_naming_enabled: true,
            allow_nested_folders: false,
            default_enlarged: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IconSettings {
    /// Icon edge length in pixels
    pub icon_size: u32,
    /// Keep resolved icons as PNG files between runs
    pub cache_icons: bool,
    /// Icon theme roots searched for file-type icons
    pub theme_dirs: Vec<PathBuf>,
}

impl Default for IconSettings {
    fn default() -> Self {
        let mut theme_dirs = Vec::new();
        if let Some(data) = dirs::data_dir() {
            theme_dirs.push(data.join("icons").join("hicolor"));
        }
        theme_dirs.push(PathBuf::from("/usr/share/icons/hicolor"));
        theme_dirs.push(PathBuf::from("/usr/share/icons/Adwaita"));
        Self {
            icon_size: 64,
            cache_icons: true,
            theme_dirs,
        }
    }
}

/// Optional location overrides; `None` means the platform default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathSettings {
    pub desktop_dir: Option<PathBuf>,
    pub layout_file: Option<PathBuf>,
    pub category_tables: Option<PathBuf>,
    pub icon_cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvancedSettings {
    /// Verbose logging
    pub debug_logging: bool,
}
