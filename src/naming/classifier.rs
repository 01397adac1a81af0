use std::path::Path;

use super::tables::{dotted_lower, CategoryTables, APPS_CATEGORY, DEFAULT_FOLDER_NAME};
use crate::models::Item;

/// Share of classified items a category needs to name the folder outright
pub const MAJORITY_THRESHOLD: f64 = 0.5;

/// Maps items to category labels and votes on folder names
#[derive(Debug, Clone, Default)]
pub struct CategoryClassifier {
    tables: CategoryTables,
}

impl CategoryClassifier {
    pub fn new(tables: CategoryTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &CategoryTables {
        &self.tables
    }

    /// Category of a single item, `None` when uncategorized
    ///
    /// Folders are never categorized. Leaves try, in order: known
    /// application names, install-path fragments, the extension table,
    /// and finally the generic apps label for launchers.
    pub fn category_of(&self, item: &Item) -> Option<String> {
        let path = item.source_path()?;
        let path_str = path.to_string_lossy();

        if let Some(category) = self.app_category(&item.display_name, &path_str) {
            return Some(category.to_string());
        }

        let extension = extension_of(path).or_else(|| extension_of(Path::new(&item.display_name)));
        if let Some(ext) = extension.as_deref() {
            if let Some(category) = self.file_category(ext) {
                return Some(category);
            }
            if self.tables.launcher_extensions.iter().any(|l| l == ext) {
                return Some(APPS_CATEGORY.to_string());
            }
        }

        None
    }

    /// Category from the application name, then from the install location
    pub fn app_category(&self, name: &str, path: &str) -> Option<&str> {
        let name = name.trim().to_lowercase();
        if !name.is_empty() {
            let by_name = self
                .tables
                .app_names
                .iter()
                .find(|rule| name.contains(&rule.pattern.to_lowercase()));
            if let Some(rule) = by_name {
                return Some(&rule.category);
            }
        }

        let path = path.replace('\\', "/").to_lowercase();
        if path.is_empty() {
            return None;
        }
        self.tables
            .path_fragments
            .iter()
            .find(|rule| path.contains(&rule.pattern.to_lowercase()))
            .map(|rule| rule.category.as_str())
    }

    /// Category for an extension such as `".pdf"`
    pub fn file_category(&self, extension: &str) -> Option<String> {
        let ext = dotted_lower(extension);
        if let Some(category) = self.tables.extensions.get(&ext) {
            return Some(category.clone());
        }
        if !self.tables.mime_fallback {
            return None;
        }

        let mime = mime_guess::from_ext(ext.trim_start_matches('.')).first()?;
        let category = match mime.type_().as_str() {
            "image" => "Images",
            "video" => "Videos",
            "audio" => "Music",
            "text" => "Documents",
            _ => return None,
        };
        Some(category.to_string())
    }

    /// Suggest a folder name for `items`
    ///
    /// Categories are tallied case-insensitively in classification order.
    /// A category holding at least half of the classified items wins; with
    /// no majority the two leading categories may roll up into a related
    /// group label. Equal counts keep first-classified order.
    pub fn suggest_folder_name<'a, I>(&self, items: I) -> String
    where
        I: IntoIterator<Item = &'a Item>,
    {
        let mut seen_any = false;
        // (lowercase key, label as first seen, count)
        let mut tally: Vec<(String, String, usize)> = Vec::new();
        let mut classified = 0usize;

        for item in items {
            seen_any = true;
            let Some(category) = self.category_of(item) else {
                continue;
            };
            classified += 1;
            let key = category.to_lowercase();
            match tally.iter_mut().find(|(k, _, _)| *k == key) {
                Some(entry) => entry.2 += 1,
                None => tally.push((key, category, 1)),
            }
        }

        if !seen_any {
            return DEFAULT_FOLDER_NAME.to_string();
        }
        if classified == 0 {
            return APPS_CATEGORY.to_string();
        }
        if classified == 1 {
            return tally[0].1.clone();
        }

        // Stable: ties keep classification order
        tally.sort_by(|a, b| b.2.cmp(&a.2));

        let (_, top_label, top_count) = &tally[0];
        let share = *top_count as f64 / classified as f64;
        if share >= MAJORITY_THRESHOLD {
            return top_label.clone();
        }

        if let Some((_, second_label, _)) = tally.get(1) {
            if let Some(broader) = self.broader_category(top_label, second_label) {
                return broader.to_string();
            }
        }

        if top_label.eq_ignore_ascii_case(APPS_CATEGORY) {
            return APPS_CATEGORY.to_string();
        }
        top_label.clone()
    }

    /// Label of the first related group containing both categories
    fn broader_category(&self, first: &str, second: &str) -> Option<&str> {
        self.tables
            .related_groups
            .iter()
            .find(|group| {
                let has = |c: &str| group.members.iter().any(|m| m.eq_ignore_ascii_case(c));
                has(first) && has(second)
            })
            .map(|group| group.label.as_str())
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_string())
        .filter(|e| !e.is_empty())
        .map(|e| dotted_lower(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::tables::{CategoryRule, RelatedGroup};

    fn item(name: &str, file: &str) -> Item {
        Item::leaf(name, format!("/home/me/Desktop/{}", file), 1)
    }

    fn classifier() -> CategoryClassifier {
        CategoryClassifier::default()
    }

    #[test]
    fn test_category_by_app_name() {
        let c = classifier();
        assert_eq!(c.category_of(&item("Steam", "Steam.lnk")).as_deref(), Some("Games"));
        assert_eq!(c.category_of(&item("Google Chrome", "Chrome.lnk")).as_deref(), Some("Browsers"));
    }

    #[test]
    fn test_category_by_install_path() {
        let c = classifier();
        let game = Item::leaf("Hollow Knight", r"D:\SteamLibrary\steamapps\common\HK\hk.exe", 1);
        assert_eq!(c.category_of(&game).as_deref(), Some("Games"));
    }

    #[test]
    fn test_category_by_extension_and_launcher_fallback() {
        let c = classifier();
        assert_eq!(c.category_of(&item("taxes", "taxes.pdf")).as_deref(), Some("Documents"));
        assert_eq!(c.category_of(&item("Frobnicator", "Frobnicator.lnk")).as_deref(), Some("Apps"));
        assert_eq!(c.category_of(&item("blob", "blob.qqq")), None);
    }

    #[test]
    fn test_folders_are_uncategorized() {
        let folder = Item::folder("Games", vec![item("Steam", "Steam.lnk"), item("Xbox", "Xbox.lnk")], true);
        assert_eq!(classifier().category_of(&folder), None);
    }

    #[test]
    fn test_suggest_empty_and_unclassified() {
        let c = classifier();
        assert_eq!(c.suggest_folder_name(std::iter::empty()), "Folder");
        let unknown = [item("blob", "blob.qqq"), item("thing", "thing.zzz")];
        assert_eq!(c.suggest_folder_name(&unknown), "Apps");
    }

    #[test]
    fn test_single_classified_item_names_folder() {
        let c = classifier();
        let items = [item("Steam", "Steam.lnk"), item("blob", "blob.qqq")];
        assert_eq!(c.suggest_folder_name(&items), "Games");
    }

    #[test]
    fn test_two_way_tie_first_classified_wins() {
        let c = classifier();
        let chrome = item("Chrome", "Chrome.lnk");
        let word = item("Word", "Word.lnk");

        assert_eq!(c.suggest_folder_name([&chrome, &word]), "Browsers");
        assert_eq!(c.suggest_folder_name([&word, &chrome]), "Productivity");
    }

    #[test]
    fn test_majority_wins() {
        let c = classifier();
        let items = [
            item("taxes", "taxes.pdf"),
            item("x", "x.png"),
            item("cv", "cv.docx"),
            item("y", "y.jpg"),
            item("notes", "notes.txt"),
        ];
        assert_eq!(c.suggest_folder_name(&items), "Documents");
    }

    #[test]
    fn test_related_group_when_no_majority() {
        let c = classifier();
        let items = [
            item("Word", "Word.lnk"),
            item("PyCharm", "PyCharm.lnk"),
            item("Spotify", "Spotify.lnk"),
        ];
        assert_eq!(c.suggest_folder_name(&items), "Work");
    }

    #[test]
    fn test_mixed_bag_falls_back_to_top_category() {
        let c = classifier();
        let items = [
            item("Steam", "Steam.lnk"),
            item("Word", "Word.lnk"),
            item("Chrome", "Chrome.lnk"),
        ];
        assert_eq!(c.suggest_folder_name(&items), "Games");
    }

    #[test]
    fn test_mixed_bag_led_by_apps_returns_apps() {
        let c = classifier();
        let items = [
            item("Frobnicator", "Frobnicator.lnk"),
            item("Steam", "Steam.lnk"),
            item("taxes", "taxes.pdf"),
        ];
        assert_eq!(c.suggest_folder_name(&items), "Apps");
    }

    #[test]
    fn test_tally_is_case_insensitive() {
        let mut tables = CategoryTables::builtin();
        tables.app_names = vec![
            CategoryRule {
                pattern: "alpha".to_string(),
                category: "Tools".to_string(),
            },
            CategoryRule {
                pattern: "beta".to_string(),
                category: "TOOLS".to_string(),
            },
        ];
        tables.related_groups = vec![RelatedGroup {
            label: "Unused".to_string(),
            members: vec![],
        }];
        let c = CategoryClassifier::new(tables);
        let items = [item("alpha", "alpha.lnk"), item("beta", "beta.lnk"), item("taxes", "taxes.pdf")];
        assert_eq!(c.suggest_folder_name(&items), "Tools");
    }

    #[test]
    fn test_order_independent_without_ties() {
        let c = classifier();
        let mut items = vec![
            item("a", "a.pdf"),
            item("b", "b.pdf"),
            item("c", "c.png"),
        ];
        let forward = c.suggest_folder_name(&items);
        items.reverse();
        assert_eq!(forward, c.suggest_folder_name(&items));
    }
}
