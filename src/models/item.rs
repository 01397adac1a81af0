use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of the generated identity of virtual folders
pub const FOLDER_ID_SCHEME: &str = "folder://";

/// Current layout snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Generate a fresh virtual folder identity (`folder://<uuid>`)
pub fn new_folder_id() -> String {
    format!("{}{}", FOLDER_ID_SCHEME, uuid::Uuid::new_v4())
}

/// A node of the desktop hierarchy
///
/// Leaves are real desktop entries identified by their path. Folders are
/// purely visual groupings identified by a generated `folder://` token.
/// Icons are never stored here: the icon resolver caches them by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Stable identity, unique among siblings
    pub id: String,
    /// Name shown under the icon
    pub display_name: String,
    pub kind: ItemKind,
}

/// The two disjoint node shapes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    Leaf {
        source_path: PathBuf,
        size_bytes: u64,
    },
    Folder {
        /// Preview-grid mode (true) or collapsed icon (false)
        enlarged: bool,
        /// Ordered children; order mirrors the on-screen layout
        children: Vec<Item>,
    },
}

impl Item {
    /// Create a leaf whose identity is its path
    pub fn leaf(display_name: impl Into<String>, source_path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        let source_path = source_path.into();
        Self {
            id: source_path.to_string_lossy().to_string(),
            display_name: display_name.into(),
            kind: ItemKind::Leaf {
                source_path,
                size_bytes,
            },
        }
    }

    /// Create a folder with a freshly generated identity
    pub fn folder(display_name: impl Into<String>, children: Vec<Item>, enlarged: bool) -> Self {
        Self {
            id: new_folder_id(),
            display_name: display_name.into(),
            kind: ItemKind::Folder { enlarged, children },
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ItemKind::Folder { .. })
    }

    /// Children of a folder, `None` for leaves
    pub fn children(&self) -> Option<&[Item]> {
        match &self.kind {
            ItemKind::Folder { children, .. } => Some(children),
            ItemKind::Leaf { .. } => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Item>> {
        match &mut self.kind {
            ItemKind::Folder { children, .. } => Some(children),
            ItemKind::Leaf { .. } => None,
        }
    }

    /// Filesystem path of a leaf, `None` for folders
    pub fn source_path(&self) -> Option<&Path> {
        match &self.kind {
            ItemKind::Leaf { source_path, .. } => Some(source_path),
            ItemKind::Folder { .. } => None,
        }
    }

    /// Size in bytes (0 for folders)
    pub fn size_bytes(&self) -> u64 {
        match &self.kind {
            ItemKind::Leaf { size_bytes, .. } => *size_bytes,
            ItemKind::Folder { .. } => 0,
        }
    }

    /// Folder display mode; leaves are never enlarged
    pub fn is_enlarged(&self) -> bool {
        matches!(self.kind, ItemKind::Folder { enlarged: true, .. })
    }

    /// Whether a direct child carries `id`
    pub fn has_child(&self, id: &str) -> bool {
        self.children()
            .map(|children| children.iter().any(|c| c.id == id))
            .unwrap_or(false)
    }

    /// Collect the paths of every leaf at or below this node
    pub fn leaf_paths(&self, out: &mut Vec<PathBuf>) {
        match &self.kind {
            ItemKind::Leaf { source_path, .. } => out.push(source_path.clone()),
            ItemKind::Folder { children, .. } => {
                for child in children {
                    child.leaf_paths(out);
                }
            }
        }
    }
}

/// Persisted form of an [`Item`]
///
/// Mirrors the item shape as a flat record. Also reads the PascalCase keys
/// written by older layout files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemRecord {
    pub id: String,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "FullPath")]
    pub path: String,
    #[serde(alias = "Size")]
    pub size: u64,
    #[serde(alias = "IsFolder")]
    pub is_folder: bool,
    #[serde(alias = "IsEnlarged")]
    pub is_enlarged: bool,
    #[serde(alias = "InnerItems")]
    pub children: Vec<ItemRecord>,
}

impl Default for ItemRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            path: String::new(),
            size: 0,
            is_folder: false,
            is_enlarged: true,
            children: Vec::new(),
        }
    }
}

impl From<&Item> for ItemRecord {
    fn from(item: &Item) -> Self {
        match &item.kind {
            ItemKind::Leaf {
                source_path,
                size_bytes,
            } => Self {
                id: item.id.clone(),
                name: item.display_name.clone(),
                path: source_path.to_string_lossy().to_string(),
                size: *size_bytes,
                is_folder: false,
                is_enlarged: false,
                children: Vec::new(),
            },
            ItemKind::Folder { enlarged, children } => Self {
                id: item.id.clone(),
                name: item.display_name.clone(),
                path: String::new(),
                size: 0,
                is_folder: true,
                is_enlarged: *enlarged,
                children: children.iter().map(ItemRecord::from).collect(),
            },
        }
    }
}

impl ItemRecord {
    /// Convert back into a live item
    ///
    /// Returns `None` for leaves that carry no path. A record without an id
    /// takes its path as id; a folder with neither gets a new identity.
    pub fn into_item(self) -> Option<Item> {
        let id = if !self.id.is_empty() {
            self.id
        } else if !self.path.is_empty() {
            self.path.clone()
        } else if self.is_folder {
            new_folder_id()
        } else {
            return None;
        };

        let kind = if self.is_folder {
            ItemKind::Folder {
                enlarged: self.is_enlarged,
                children: self
                    .children
                    .into_iter()
                    .filter_map(ItemRecord::into_item)
                    .collect(),
            }
        } else {
            if self.path.is_empty() {
                return None;
            }
            ItemKind::Leaf {
                source_path: PathBuf::from(self.path),
                size_bytes: self.size,
            }
        };

        Some(Item {
            id,
            display_name: self.name,
            kind,
        })
    }
}

/// The unit exchanged with the layout store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl Default for LayoutSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: None,
            items: Vec::new(),
        }
    }
}

impl LayoutSnapshot {
    /// Capture the top-level sequence as a snapshot stamped with the current time
    pub fn capture(items: &[Item]) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Some(Utc::now()),
            items: items.iter().map(ItemRecord::from).collect(),
        }
    }

    /// Wrap records read from a bare legacy array
    pub fn from_records(items: Vec<ItemRecord>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: None,
            items,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Convert records into items, dropping unusable records
    pub fn into_items(self) -> Vec<Item> {
        self.items
            .into_iter()
            .filter_map(ItemRecord::into_item)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_identity_is_path() {
        let item = Item::leaf("Steam", "/home/me/Desktop/Steam.desktop", 120);
        assert_eq!(item.id, "/home/me/Desktop/Steam.desktop");
        assert!(!item.is_folder());
        assert_eq!(item.size_bytes(), 120);
        assert!(item.children().is_none());
    }

    #[test]
    fn test_folder_identity_is_generated() {
        let a = Item::folder("Games", Vec::new(), true);
        let b = Item::folder("Games", Vec::new(), true);
        assert!(a.id.starts_with(FOLDER_ID_SCHEME));
        assert_ne!(a.id, b.id);
        assert!(a.is_enlarged());
        assert_eq!(a.size_bytes(), 0);
    }

    #[test]
    fn test_legacy_record_keys() {
        let json = r#"[{"Name":"Work","FullPath":"folder://abc","Size":0,"IsFolder":true,
            "IsEnlarged":false,"InnerItems":[{"Name":"Word","FullPath":"C:\\Desktop\\Word.lnk","Size":1400,
            "IsFolder":false,"IsEnlarged":true,"InnerItems":[]}]}]"#;
        let records: Vec<ItemRecord> = serde_json::from_str(json).unwrap();
        let items = LayoutSnapshot::from_records(records).into_items();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "folder://abc");
        assert!(!items[0].is_enlarged());
        let children = items[0].children().unwrap();
        assert_eq!(children[0].id, "C:\\Desktop\\Word.lnk");
        assert_eq!(children[0].size_bytes(), 1400);
    }

    #[test]
    fn test_pathless_leaf_is_dropped() {
        let record = ItemRecord {
            name: "ghost".to_string(),
            ..ItemRecord::default()
        };
        assert!(record.into_item().is_none());
    }

    #[test]
    fn test_leaf_paths_walks_folders() {
        let folder = Item::folder(
            "Docs",
            vec![Item::leaf("a", "/d/a.pdf", 1), Item::leaf("b", "/d/b.pdf", 2)],
            true,
        );
        let mut paths = Vec::new();
        folder.leaf_paths(&mut paths);
        assert_eq!(paths, vec![PathBuf::from("/d/a.pdf"), PathBuf::from("/d/b.pdf")]);
    }
}
