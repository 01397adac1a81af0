//! Desktop directory, settings and shell-side file moves

use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use tokio::sync::mpsc;

use super::{AppState, CommandError};
use crate::models::{AppSettings, Item};
use crate::organizer::{EnginePolicy, Outcome};
use crate::services::{file_ops, settings as settings_store, DesktopChange, DesktopWatcher};

/// Counts shown in the status bar and logged at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesktopSummary {
    pub desktop_dir: String,
    pub top_level: usize,
    pub folders: usize,
    pub leaves: usize,
    pub total_bytes: u64,
    pub total_size: String,
}

impl AppState {
    /// Adopt a new desktop entry or forget a vanished one
    pub async fn apply_desktop_change(&self, change: DesktopChange) -> Result<Outcome, CommandError> {
        match change {
            DesktopChange::Added(item) => self.mutate(|engine| engine.adopt(item)).await,
            DesktopChange::Removed(path) => {
                self.icons.invalidate_path(&path);
                let id = path.to_string_lossy().to_string();
                self.mutate(|engine| engine.forget(&id)).await
            }
        }
    }

    /// Watch the desktop directory until the state is dropped
    pub fn start_watcher(self: &Arc<Self>) -> Result<(), CommandError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = DesktopWatcher::start(&self.desktop_dir, tx)?;
        *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(watcher);

        let state = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                let Some(state) = state.upgrade() else {
                    break;
                };
                if let Err(e) = state.apply_desktop_change(change).await {
                    tracing::warn!(error = %e, "Failed to apply desktop change");
                }
            }
            tracing::debug!("Desktop change consumer stopped");
        });
        Ok(())
    }

    pub fn stop_watcher(&self) {
        if self.watcher.lock().unwrap_or_else(PoisonError::into_inner).take().is_some() {
            tracing::info!("Stopped desktop watcher");
        }
    }

    /// Physically move files into `destination` (shell integration only)
    pub async fn move_files(&self, paths: Vec<PathBuf>, destination: PathBuf) -> Result<usize, CommandError> {
        let moved = tokio::task::spawn_blocking(move || file_ops::move_files(&paths, &destination)).await??;
        Ok(moved)
    }

    pub async fn get_settings(&self) -> AppSettings {
        self.settings.read().await.clone()
    }

    /// Persist `settings` and apply them to subsequent operations
    pub async fn update_settings(&self, settings: AppSettings) -> Result<(), CommandError> {
        if let Some(path) = self.settings_path.clone() {
            let to_save = settings.clone();
            tokio::task::spawn_blocking(move || settings_store::save_settings(&path, &to_save)).await??;
        }

        self.engine().await.set_policy(EnginePolicy::from_settings(&settings));
        *self.settings.write().await = settings;
        tracing::info!("Settings updated");
        Ok(())
    }

    pub async fn summary(&self) -> DesktopSummary {
        let engine = self.engine().await;
        let items = engine.tree().items();
        let folders = items.iter().filter(|item| item.is_folder()).count();
        let leaves = engine.tree().leaf_paths().len();
        let total_bytes = total_bytes(items);

        DesktopSummary {
            desktop_dir: self.desktop_dir.display().to_string(),
            top_level: items.len(),
            folders,
            leaves,
            total_bytes,
            total_size: size_label(total_bytes),
        }
    }
}

/// Size label for the status bar, e.g. `"840B"`, `"12KB"`, `"3.4MB"`
///
/// Kilobytes are rounded to whole numbers; larger units keep one decimal.
fn size_label(bytes: u64) -> String {
    const UNITS: [(&str, u64); 4] = [("TB", 1 << 40), ("GB", 1 << 30), ("MB", 1 << 20), ("KB", 1 << 10)];

    match UNITS.iter().find(|(_, scale)| bytes >= *scale) {
        Some(("KB", scale)) => format!("{:.0}KB", bytes as f64 / *scale as f64),
        Some((unit, scale)) => format!("{:.1}{}", bytes as f64 / *scale as f64, unit),
        None => format!("{}B", bytes),
    }
}

fn total_bytes(items: &[Item]) -> u64 {
    items
        .iter()
        .map(|item| match item.children() {
            Some(children) => total_bytes(children),
            None => item.size_bytes(),
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::create_test_state;
    use std::time::Duration;

    fn leaf(name: &str, size: u64) -> Item {
        Item::leaf(name, format!("/desk/{}", name), size)
    }

    #[tokio::test]
    async fn test_added_and_removed_changes() {
        let (state, _store, _dir) = create_test_state(vec![leaf("a", 1), leaf("b", 1), leaf("c", 1)]);
        state.create_folder("/desk/a", "/desk/b").await.unwrap();

        let added = state
            .apply_desktop_change(DesktopChange::Added(leaf("d", 1)))
            .await
            .unwrap();
        assert_eq!(added, Outcome::Updated);
        let again = state
            .apply_desktop_change(DesktopChange::Added(leaf("d", 1)))
            .await
            .unwrap();
        assert_eq!(again, Outcome::Unchanged);

        state
            .apply_desktop_change(DesktopChange::Removed(PathBuf::from("/desk/a")))
            .await
            .unwrap();
        let layout = state.get_layout().await;
        let names: Vec<_> = layout.items.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "d"]);
        assert!(!state.history_status().await.can_undo);
    }

    #[tokio::test]
    async fn test_watcher_adopts_new_files() {
        let (state, _store, dir) = create_test_state(Vec::new());
        let state = Arc::new(state);
        state.start_watcher().unwrap();

        std::fs::write(dir.path().join("fresh.txt"), "hi").unwrap();

        let mut adopted = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if state.engine().await.tree().len() == 1 {
                adopted = true;
                break;
            }
        }
        state.stop_watcher();
        assert!(adopted);
    }

    #[tokio::test]
    async fn test_move_files_runs_off_the_runtime() {
        let (state, _store, dir) = create_test_state(Vec::new());
        let file = dir.path().join("a.txt");
        let target = dir.path().join("archive");
        std::fs::write(&file, "a").unwrap();
        std::fs::create_dir(&target).unwrap();

        assert_eq!(state.move_files(vec![file.clone()], target.clone()).await.unwrap(), 1);
        assert!(target.join("a.txt").exists());

        let missing = state.move_files(vec![target.join("a.txt")], dir.path().join("nope")).await;
        assert!(matches!(missing, Err(CommandError::FileOp(_))));
    }

    #[tokio::test]
    async fn test_update_settings_persists_and_applies_policy() {
        let (state, _store, dir) = create_test_state(vec![leaf("a", 1), leaf("b", 1), leaf("c", 1), leaf("d", 1)]);
        let mut settings = state.get_settings().await;
        settings.folders.smart_naming_enabled = false;
        settings.folders.allow_nested_folders = true;
        state.update_settings(settings.clone()).await.unwrap();

        let saved = settings_store::load_settings(&dir.path().join("settings.json"));
        assert_eq!(saved, settings);

        let outcome = state.create_folder("/desk/a", "/desk/b").await.unwrap();
        assert!(matches!(outcome, Outcome::FolderCreated { ref name, .. } if name == "Folder"));
        assert!(state.engine().await.policy().allow_nested_folders);
    }

    #[test]
    fn test_size_label_units() {
        assert_eq!(size_label(0), "0B");
        assert_eq!(size_label(1023), "1023B");
        assert_eq!(size_label(1536), "2KB");
        assert_eq!(size_label(5 * 1024 * 1024 + 512 * 1024), "5.5MB");
        assert_eq!(size_label(3 << 30), "3.0GB");
        assert_eq!(size_label(1 << 40), "1.0TB");
    }

    #[tokio::test]
    async fn test_summary_counts_items() {
        let (state, _store, _dir) = create_test_state(vec![leaf("a", 1024), leaf("b", 1024), leaf("c", 10)]);
        state.create_folder("/desk/a", "/desk/b").await.unwrap();

        let summary = state.summary().await;
        assert_eq!(summary.top_level, 2);
        assert_eq!(summary.folders, 1);
        assert_eq!(summary.leaves, 3);
        assert_eq!(summary.total_bytes, 2058);
        assert_eq!(summary.total_size, "2KB");
    }
}
