//! Grouping gestures, history and layout reload

use serde::Serialize;

use super::{AppState, CommandError};
use crate::models::LayoutSnapshot;
use crate::organizer::Outcome;

/// Undo/redo availability for the toolbar
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStatus {
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_len: usize,
    pub redo_len: usize,
    pub revision: u64,
}

impl AppState {
    pub async fn get_layout(&self) -> LayoutSnapshot {
        self.engine().await.snapshot()
    }

    pub async fn create_folder(&self, source_id: &str, target_id: &str) -> Result<Outcome, CommandError> {
        self.mutate(|engine| engine.create_folder(source_id, target_id)).await
    }

    pub async fn add_to_folder(&self, item_id: &str, folder_id: &str) -> Result<Outcome, CommandError> {
        self.mutate(|engine| engine.add_to_folder(item_id, folder_id)).await
    }

    pub async fn remove_from_folder(&self, item_id: &str, folder_id: &str) -> Result<Outcome, CommandError> {
        self.mutate(|engine| engine.remove_from_folder(item_id, folder_id)).await
    }

    pub async fn move_item(&self, source_id: &str, target_id: &str) -> Result<Outcome, CommandError> {
        self.mutate(|engine| engine.move_item(source_id, target_id)).await
    }

    pub async fn undo(&self) -> Result<Outcome, CommandError> {
        self.mutate(|engine| engine.undo()).await
    }

    pub async fn redo(&self) -> Result<Outcome, CommandError> {
        self.mutate(|engine| engine.redo()).await
    }

    pub async fn rename_item(&self, id: &str, name: &str) -> Result<Outcome, CommandError> {
        self.mutate(|engine| engine.rename_item(id, name)).await
    }

    pub async fn set_folder_enlarged(&self, folder_id: &str, enlarged: bool) -> Result<Outcome, CommandError> {
        self.mutate(|engine| engine.set_folder_enlarged(folder_id, enlarged)).await
    }

    pub async fn history_status(&self) -> HistoryStatus {
        let engine = self.engine().await;
        let history = engine.history();
        HistoryStatus {
            can_undo: history.can_undo(),
            can_redo: history.can_redo(),
            undo_len: history.undo_len(),
            redo_len: history.redo_len(),
            revision: engine.revision(),
        }
    }

    /// Folder name the classifier would pick for these items
    pub async fn suggest_folder_name(&self, ids: &[String]) -> String {
        let engine = self.engine().await;
        let items: Vec<_> = ids
            .iter()
            .filter_map(|id| engine.tree().find_by_id(id).map(|located| located.item))
            .collect();
        engine.classifier().suggest_folder_name(items)
    }

    /// Re-read the saved layout, dropping history and memoized icons
    pub async fn reload_layout(&self) -> Result<usize, CommandError> {
        let store = std::sync::Arc::clone(self.saver.store());
        let snapshot = tokio::task::spawn_blocking(move || store.load()).await??;

        let count = {
            let mut engine = self.engine().await;
            engine.replace_tree(snapshot.into_items());
            engine.tree().len()
        };
        self.icons().invalidate_all();

        tracing::info!(count, "Layout reloaded");
        Ok(count)
    }
}
