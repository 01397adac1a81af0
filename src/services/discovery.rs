//! Desktop discovery
//!
//! Lists the entries of the desktop directory as leaves. Used for the first
//! launch and to pick up entries a saved layout does not know yet.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::Item;
use crate::tree::{ItemTree, ParentRef};

/// Extensions whose display name hides the extension
const SHORTCUT_EXTENSIONS: &[&str] = &["lnk", "desktop", "url"];

/// `~/Desktop`, or the home directory when no desktop is configured
pub fn default_desktop_dir() -> Option<PathBuf> {
    dirs::desktop_dir().or_else(dirs::home_dir)
}

/// Entries the desktop never shows
pub fn is_ignored(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let lower = name.to_lowercase();

    name.is_empty()
        || name.starts_with('.')
        || lower == "desktop.ini"
        || lower.ends_with(".tmp")
        || lower.ends_with(".crdownload")
        || lower.ends_with(".part")
}

/// Name shown under the icon
pub fn display_name(path: &Path) -> String {
    let is_shortcut = path
        .extension()
        .map(|e| SHORTCUT_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
        .unwrap_or(false);

    let name = if is_shortcut { path.file_stem() } else { path.file_name() };
    name.map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
}

/// Leaf for one desktop entry, `None` when ignored or unreadable
pub fn leaf_for(path: &Path) -> Option<Item> {
    if is_ignored(path) {
        return None;
    }
    let metadata = std::fs::symlink_metadata(path).ok()?;
    let size = if metadata.is_file() { metadata.len() } else { 0 };
    Some(Item::leaf(display_name(path), path, size))
}

/// Top-level entries of `dir`, sorted by display name
pub fn discover_desktop(dir: &Path) -> Vec<Item> {
    let mut items: Vec<Item> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable desktop entry");
                None
            }
        })
        .filter_map(|entry| leaf_for(entry.path()))
        .collect();

    items.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });

    tracing::info!(dir = %dir.display(), count = items.len(), "Discovered desktop items");
    items
}

/// Append discovered leaves the tree does not hold yet
///
/// Returns how many were added.
pub fn reconcile(tree: &mut ItemTree, discovered: Vec<Item>) -> usize {
    let known: HashSet<PathBuf> = tree.leaf_paths().into_iter().collect();
    let mut added = 0;

    for item in discovered {
        let is_known = item.source_path().map(|p| known.contains(p)).unwrap_or(false);
        if is_known || tree.contains(&item.id) {
            continue;
        }
        if tree.push(&ParentRef::Root, item).is_ok() {
            added += 1;
        }
    }

    if added > 0 {
        tracing::info!(added, "Added new desktop items to layout");
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn create_test_desktop() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        fs::write(dir.path().join("Steam.desktop"), "[Desktop Entry]\n").unwrap();
        fs::write(dir.path().join("Chrome.lnk"), "").unwrap();
        fs::write(dir.path().join(".hidden"), "").unwrap();
        fs::write(dir.path().join("desktop.ini"), "").unwrap();
        fs::write(dir.path().join("movie.mkv.crdownload"), "").unwrap();
        fs::create_dir(dir.path().join("Projects")).unwrap();
        fs::write(dir.path().join("Projects").join("inner.txt"), "").unwrap();
        dir
    }

    #[test]
    fn test_discover_desktop() {
        let dir = create_test_desktop();
        let items = discover_desktop(dir.path());

        let names: Vec<&str> = items.iter().map(|i| i.display_name.as_str()).collect();
        assert_eq!(names, vec!["Chrome", "notes.txt", "Projects", "Steam"]);

        let notes = items.iter().find(|i| i.display_name == "notes.txt").unwrap();
        assert_eq!(notes.size_bytes(), 5);
        assert_eq!(notes.id, dir.path().join("notes.txt").to_string_lossy());
    }

    #[test]
    fn test_reconcile_adds_only_unknown() {
        let dir = create_test_desktop();
        let discovered = discover_desktop(dir.path());

        let chrome = discovered[0].clone();
        let notes = discovered[1].clone();
        let folder = Item::folder("Stuff", vec![chrome, notes], true);
        let mut tree = ItemTree::rehydrate(vec![folder]);

        let added = reconcile(&mut tree, discovered);
        assert_eq!(added, 2);
        assert_eq!(tree.len(), 3);

        assert_eq!(reconcile(&mut tree, discover_desktop(dir.path())), 0);
    }
}
