//! Category mapping tables
//!
//! Data-only configuration for the classifier. The built-in tables cover
//! common desktop applications and file types; a JSON file with the same
//! shape can replace them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Generic label for executables and shortcuts nobody recognised
pub const APPS_CATEGORY: &str = "Apps";

/// Label used when there is nothing to name a folder after
pub const DEFAULT_FOLDER_NAME: &str = "Folder";

#[derive(Debug, Error)]
pub enum TablesError {
    #[error("Failed to read category tables {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid category tables {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A case-insensitive substring rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub pattern: String,
    pub category: String,
}

/// Categories that roll up into a broader label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedGroup {
    pub label: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryTables {
    /// Known application name fragments, first match wins
    pub app_names: Vec<CategoryRule>,
    /// Install-location fragments matched against a `/`-normalised path
    pub path_fragments: Vec<CategoryRule>,
    /// Extension (with leading dot, lowercase) to category
    pub extensions: HashMap<String, String>,
    /// Clusters checked when no category holds a majority
    pub related_groups: Vec<RelatedGroup>,
    /// Extensions that fall back to the generic apps category
    pub launcher_extensions: Vec<String>,
    /// Classify unknown extensions by their MIME top-level type
    pub mime_fallback: bool,
}

impl Default for CategoryTables {
    fn default() -> Self {
        Self::builtin()
    }
}

fn rules(pairs: &[(&str, &str)]) -> Vec<CategoryRule> {
    pairs
        .iter()
        .map(|(pattern, category)| CategoryRule {
            pattern: pattern.to_string(),
            category: category.to_string(),
        })
        .collect()
}

impl CategoryTables {
    /// Tables shipped with the application
    pub fn builtin() -> Self {
        // Longer fragments precede their prefixes ("visual studio code" before "visual studio")
        let app_names = rules(&[
            ("google chrome", "Browsers"),
            ("chrome", "Browsers"),
            ("firefox", "Browsers"),
            ("microsoft edge", "Browsers"),
            ("brave", "Browsers"),
            ("opera", "Browsers"),
            ("vivaldi", "Browsers"),
            ("safari", "Browsers"),
            ("word", "Productivity"),
            ("excel", "Productivity"),
            ("powerpoint", "Productivity"),
            ("outlook", "Productivity"),
            ("onenote", "Productivity"),
            ("libreoffice", "Productivity"),
            ("notion", "Productivity"),
            ("obsidian", "Productivity"),
            ("evernote", "Productivity"),
            ("acrobat", "Productivity"),
            ("visual studio code", "Development"),
            ("visual studio", "Development"),
            ("vs code", "Development"),
            ("intellij", "Development"),
            ("pycharm", "Development"),
            ("webstorm", "Development"),
            ("rider", "Development"),
            ("android studio", "Development"),
            ("github desktop", "Development"),
            ("git bash", "Development"),
            ("docker", "Development"),
            ("postman", "Development"),
            ("terminal", "Development"),
            ("sublime", "Development"),
            ("notepad++", "Development"),
            ("steam", "Games"),
            ("epic games", "Games"),
            ("battle.net", "Games"),
            ("gog galaxy", "Games"),
            ("ubisoft", "Games"),
            ("minecraft", "Games"),
            ("riot client", "Games"),
            ("league of legends", "Games"),
            ("xbox", "Games"),
            ("bluestacks", "Games"),
            ("spotify", "Media"),
            ("vlc", "Media"),
            ("itunes", "Media"),
            ("netflix", "Media"),
            ("obs studio", "Media"),
            ("audacity", "Media"),
            ("discord", "Communication"),
            ("slack", "Communication"),
            ("teams", "Communication"),
            ("zoom", "Communication"),
            ("skype", "Communication"),
            ("telegram", "Communication"),
            ("whatsapp", "Communication"),
            ("signal", "Communication"),
            ("photoshop", "Design"),
            ("illustrator", "Design"),
            ("lightroom", "Design"),
            ("premiere", "Design"),
            ("figma", "Design"),
            ("gimp", "Design"),
            ("inkscape", "Design"),
            ("blender", "Design"),
            ("krita", "Design"),
            ("7-zip", "Utilities"),
            ("winrar", "Utilities"),
            ("ccleaner", "Utilities"),
            ("control panel", "Utilities"),
            ("calculator", "Utilities"),
            ("task manager", "Utilities"),
        ]);

        let path_fragments = rules(&[
            ("/steamapps/", "Games"),
            ("/games/", "Games"),
            ("/program files/microsoft office/", "Productivity"),
            ("/jetbrains/", "Development"),
            ("/visual studio/", "Development"),
        ]);

        let mut extensions = HashMap::new();
        let groups: &[(&str, &[&str])] = &[
            ("Documents", &[".pdf", ".doc", ".docx", ".txt", ".rtf", ".odt", ".md", ".epub"]),
            ("Spreadsheets", &[".xls", ".xlsx", ".ods", ".csv"]),
            ("Presentations", &[".ppt", ".pptx", ".odp", ".key"]),
            ("Images", &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg", ".heic", ".tiff", ".ico"]),
            ("Videos", &[".mp4", ".mkv", ".avi", ".mov", ".wmv", ".webm"]),
            ("Music", &[".mp3", ".wav", ".flac", ".aac", ".ogg", ".m4a"]),
            ("Archives", &[".zip", ".rar", ".7z", ".tar", ".gz", ".xz"]),
            ("Code", &[".rs", ".py", ".js", ".ts", ".cs", ".java", ".cpp", ".c", ".h", ".go", ".html", ".css", ".json"]),
            ("Installers", &[".msi", ".dmg", ".pkg", ".deb", ".rpm"]),
        ];
        for (category, exts) in groups {
            for ext in *exts {
                extensions.insert(ext.to_string(), category.to_string());
            }
        }

        let related_groups = vec![
            RelatedGroup {
                label: "Work".to_string(),
                members: ["Productivity", "Development", "Documents", "Spreadsheets", "Presentations", "Code"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            RelatedGroup {
                label: "Entertainment".to_string(),
                members: ["Games", "Media", "Music", "Videos"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            RelatedGroup {
                label: "Creative".to_string(),
                members: ["Design", "Images", "Videos", "Music"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            RelatedGroup {
                label: "Internet".to_string(),
                members: ["Browsers", "Communication"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
        ];

        Self {
            app_names,
            path_fragments,
            extensions,
            related_groups,
            launcher_extensions: [".lnk", ".exe", ".url", ".desktop", ".appimage", ".app"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            mime_fallback: true,
        }
    }

    /// Read tables from a JSON file
    pub fn load(path: &Path) -> Result<Self, TablesError> {
        let raw = std::fs::read_to_string(path).map_err(|source| TablesError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut tables: Self = serde_json::from_str(&raw).map_err(|source| TablesError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        tables.normalize();
        Ok(tables)
    }

    /// Lowercase extension keys and make sure they carry a leading dot
    fn normalize(&mut self) {
        self.extensions = std::mem::take(&mut self.extensions)
            .into_iter()
            .map(|(ext, category)| (dotted_lower(&ext), category))
            .collect();
        self.launcher_extensions = self.launcher_extensions.iter().map(|e| dotted_lower(e)).collect();
    }
}

/// `"PDF"` and `".pdf"` both become `".pdf"`
pub(crate) fn dotted_lower(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}
