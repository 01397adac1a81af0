use serde::Serialize;
use tokio::sync::watch;

use super::history::{UndoAction, UndoHistory};
use crate::models::{AppSettings, Item, ItemKind, LayoutSnapshot};
use crate::naming::{CategoryClassifier, DEFAULT_FOLDER_NAME};
use crate::tree::{Dissolution, ItemTree, ParentRef, TreeError};

/// Folder policy consulted on every merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePolicy {
    pub allow_nested_folders: bool,
    pub smart_naming: bool,
    pub default_enlarged: bool,
    pub undo_depth: usize,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self::from_settings(&AppSettings::default())
    }
}

impl EnginePolicy {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            allow_nested_folders: settings.folders.allow_nested_folders,
            smart_naming: settings.folders.smart_naming_enabled,
            default_enlarged: settings.folders.default_enlarged,
            undo_depth: settings.general.undo_depth(),
        }
    }
}

/// What a successful call did to the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Outcome {
    /// Nothing changed (a documented no-op)
    Unchanged,
    #[serde(rename_all = "camelCase")]
    FolderCreated { folder_id: String, name: String },
    #[serde(rename_all = "camelCase")]
    AddedToFolder { folder_id: String },
    #[serde(rename_all = "camelCase")]
    RemovedFromFolder { folder_id: String, dissolved: bool },
    Moved,
    /// Rename, display mode, adopt or forget
    Updated,
    Undone,
    Redone,
}

impl Outcome {
    pub fn is_change(&self) -> bool {
        !matches!(self, Outcome::Unchanged)
    }
}

/// Owns the item tree and applies grouping gestures to it
///
/// Every mutation either fully applies or leaves the tree untouched. After
/// each successful mutation the revision published on [`subscribe`]
/// increases, which is the cue for persistence and presentation layers.
///
/// [`subscribe`]: OrganizationEngine::subscribe
pub struct OrganizationEngine {
    tree: ItemTree,
    history: UndoHistory,
    classifier: CategoryClassifier,
    policy: EnginePolicy,
    revision: u64,
    changes: watch::Sender<u64>,
}

impl OrganizationEngine {
    pub fn new(tree: ItemTree, classifier: CategoryClassifier, policy: EnginePolicy) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            tree,
            history: UndoHistory::new(policy.undo_depth),
            classifier,
            policy,
            revision: 0,
            changes,
        }
    }

    pub fn tree(&self) -> &ItemTree {
        &self.tree
    }

    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    /// Apply changed settings; affects subsequent operations only
    pub fn set_policy(&mut self, policy: EnginePolicy) {
        self.history.set_depth(policy.undo_depth);
        self.policy = policy;
    }

    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    pub fn classifier(&self) -> &CategoryClassifier {
        &self.classifier
    }

    /// Revision of the latest successful mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Receive the revision after every successful mutation
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Serialized form of the current tree
    pub fn snapshot(&self) -> LayoutSnapshot {
        LayoutSnapshot::capture(self.tree.items())
    }

    fn mark_changed(&mut self) {
        self.revision += 1;
        self.changes.send_replace(self.revision);
    }

    fn suggest_name(&self, items: &[&Item]) -> String {
        if self.policy.smart_naming {
            self.classifier.suggest_folder_name(items.iter().copied())
        } else {
            DEFAULT_FOLDER_NAME.to_string()
        }
    }

    /// Drop `source` onto `target`
    ///
    /// Folders absorb the other item; two plain items become a new folder
    /// at the earlier of their positions, named from their content.
    pub fn create_folder(&mut self, source_id: &str, target_id: &str) -> Result<Outcome, TreeError> {
        if source_id == target_id {
            tracing::debug!(id = %source_id, "Dropped item onto itself");
            return Ok(Outcome::Unchanged);
        }

        let (source, target) = match (self.tree.find_by_id(source_id), self.tree.find_by_id(target_id)) {
            (None, None) => {
                tracing::debug!(source = %source_id, target = %target_id, "Neither drop item is on the desktop");
                return Ok(Outcome::Unchanged);
            }
            (None, Some(_)) => return Err(TreeError::NotFound(source_id.to_string())),
            (Some(_), None) => return Err(TreeError::NotFound(target_id.to_string())),
            (Some(source), Some(target)) => (source.item, target.item),
        };

        if target.is_folder() {
            return self.add_to_folder(source_id, target_id);
        }
        if source.is_folder() {
            return self.add_to_folder(target_id, source_id);
        }

        let source_index = self
            .tree
            .top_level_index(source_id)
            .ok_or_else(|| TreeError::NotFound(source_id.to_string()))?;
        let target_index = self
            .tree
            .top_level_index(target_id)
            .ok_or_else(|| TreeError::NotFound(target_id.to_string()))?;

        let name = self.suggest_name(&[source, target]);
        let originals = vec![(source_index, source.clone()), (target_index, target.clone())];
        let folder = Item::folder(
            name.clone(),
            originals.iter().map(|(_, item)| item.clone()).collect(),
            self.policy.default_enlarged,
        );

        let folder_index = self.tree.transaction(|draft| {
            draft.remove_by_id(&ParentRef::Root, source_id)?;
            draft.remove_by_id(&ParentRef::Root, target_id)?;
            let at = source_index.min(target_index).min(draft.len());
            draft.insert_at(&ParentRef::Root, at, folder.clone())?;
            Ok::<_, TreeError>(at)
        })?;

        tracing::info!(
            folder_id = %folder.id,
            name = %name,
            source = %source_id,
            target = %target_id,
            "Created folder"
        );

        let folder_id = folder.id.clone();
        self.history.record(UndoAction::CreateFolder {
            folder,
            folder_index,
            originals,
        });
        self.mark_changed();

        Ok(Outcome::FolderCreated { folder_id, name })
    }

    /// Move a top-level item into a folder (appended at the end)
    pub fn add_to_folder(&mut self, item_id: &str, folder_id: &str) -> Result<Outcome, TreeError> {
        if item_id == folder_id {
            return Ok(Outcome::Unchanged);
        }

        let folder = self
            .tree
            .find_by_id(folder_id)
            .ok_or_else(|| TreeError::NotFound(folder_id.to_string()))?
            .item;
        if !folder.is_folder() {
            tracing::debug!(id = %folder_id, "Drop target is not a folder");
            return Ok(Outcome::Unchanged);
        }
        if folder.has_child(item_id) {
            tracing::debug!(id = %item_id, folder_id = %folder_id, "Item already in folder");
            return Ok(Outcome::Unchanged);
        }

        let index = self
            .tree
            .top_level_index(item_id)
            .ok_or_else(|| TreeError::NotFound(item_id.to_string()))?;
        let item = self.tree.items()[index].clone();
        if item.is_folder() && !self.policy.allow_nested_folders {
            tracing::debug!(id = %item_id, "Nested folders are disabled");
            return Ok(Outcome::Unchanged);
        }

        self.tree.transaction(|draft| {
            draft.remove_by_id(&ParentRef::Root, item_id)?;
            draft.push(&ParentRef::folder(folder_id), item.clone())
        })?;

        tracing::info!(id = %item_id, folder_id = %folder_id, "Added item to folder");

        self.history.record(UndoAction::AddToFolder {
            folder_id: folder_id.to_string(),
            item,
            index,
        });
        self.mark_changed();

        Ok(Outcome::AddedToFolder {
            folder_id: folder_id.to_string(),
        })
    }

    /// Take an item out of a folder and append it to the desktop
    ///
    /// A folder left with a single child dissolves into it.
    pub fn remove_from_folder(&mut self, item_id: &str, folder_id: &str) -> Result<Outcome, TreeError> {
        let action = self.apply_remove_from_folder(item_id, folder_id)?;
        let dissolved = matches!(
            action,
            UndoAction::RemoveFromFolder {
                dissolution: Some(_),
                ..
            }
        );

        tracing::info!(id = %item_id, folder_id = %folder_id, dissolved, "Removed item from folder");

        self.history.record(action);
        self.mark_changed();

        Ok(Outcome::RemovedFromFolder {
            folder_id: folder_id.to_string(),
            dissolved,
        })
    }

    fn apply_remove_from_folder(&mut self, item_id: &str, folder_id: &str) -> Result<UndoAction, TreeError> {
        let located = self
            .tree
            .find_by_id(folder_id)
            .ok_or_else(|| TreeError::NotFound(folder_id.to_string()))?;
        if !located.item.is_folder() {
            return Err(TreeError::NotAFolder(folder_id.to_string()));
        }
        if !located.item.has_child(item_id) {
            return Err(TreeError::NotFound(item_id.to_string()));
        }
        let parent = located.parent();
        let folder_index = located.index;
        let folder_before = located.item.clone();

        let dissolution = self.tree.transaction(|draft| {
            let removed = draft.remove_by_id(&ParentRef::folder(folder_id), item_id)?;
            draft.push(&ParentRef::Root, removed.item)?;
            Ok::<_, TreeError>(removed.dissolution)
        })?;

        Ok(UndoAction::RemoveFromFolder {
            parent,
            folder_before,
            folder_index,
            item_id: item_id.to_string(),
            dissolution,
        })
    }

    /// Reposition `source` to `target`'s top-level slot
    ///
    /// Position-only moves are not recorded in the undo history.
    pub fn move_item(&mut self, source_id: &str, target_id: &str) -> Result<Outcome, TreeError> {
        if source_id == target_id {
            return Ok(Outcome::Unchanged);
        }
        let (Some(from), Some(to)) = (
            self.tree.top_level_index(source_id),
            self.tree.top_level_index(target_id),
        ) else {
            return Ok(Outcome::Unchanged);
        };

        self.tree.move_within(&ParentRef::Root, from, to)?;
        tracing::debug!(id = %source_id, from, to, "Moved item");
        self.mark_changed();
        Ok(Outcome::Moved)
    }

    /// Invert the most recent action
    pub fn undo(&mut self) -> Result<Outcome, TreeError> {
        let Some(action) = self.history.pop_undo() else {
            return Ok(Outcome::Unchanged);
        };

        match self.revert(&action) {
            Ok(updated) => {
                tracing::info!(action = updated.label(), "Undo");
                self.history.push_redo(updated);
                self.mark_changed();
                Ok(Outcome::Undone)
            }
            Err(e) => {
                tracing::warn!(action = action.label(), error = %e, "Undo failed");
                self.history.push_undo(action);
                Err(e)
            }
        }
    }

    /// Re-apply the most recently undone action
    pub fn redo(&mut self) -> Result<Outcome, TreeError> {
        let Some(action) = self.history.pop_redo() else {
            return Ok(Outcome::Unchanged);
        };

        match self.reapply(&action) {
            Ok(updated) => {
                tracing::info!(action = updated.label(), "Redo");
                self.history.push_undo(updated);
                self.mark_changed();
                Ok(Outcome::Redone)
            }
            Err(e) => {
                tracing::warn!(action = action.label(), error = %e, "Redo failed");
                self.history.push_redo(action);
                Err(e)
            }
        }
    }

    /// Undo one action; returns the action to store on the redo stack
    fn revert(&mut self, action: &UndoAction) -> Result<UndoAction, TreeError> {
        match action {
            UndoAction::CreateFolder {
                folder, originals, ..
            } => self.tree.transaction(|draft| {
                let removed = draft.remove_by_id(&ParentRef::Root, &folder.id)?;
                let current = removed.item;

                // Ascending order so every item lands on its recorded index
                let mut restore: Vec<&(usize, Item)> = originals.iter().collect();
                restore.sort_by_key(|(index, _)| *index);
                for (index, original) in restore {
                    let item = current
                        .children()
                        .and_then(|children| children.iter().find(|c| c.id == original.id))
                        .unwrap_or(original)
                        .clone();
                    let at = (*index).min(draft.len());
                    draft.insert_at(&ParentRef::Root, at, item)?;
                }

                Ok::<_, TreeError>(UndoAction::CreateFolder {
                    folder: current,
                    folder_index: removed.index,
                    originals: originals.clone(),
                })
            }),

            UndoAction::AddToFolder {
                folder_id,
                item,
                index,
            } => self.tree.transaction(|draft| {
                let removed = draft.remove_by_id(&ParentRef::folder(folder_id.as_str()), &item.id)?;
                let at = (*index).min(draft.len());
                draft.insert_at(&ParentRef::Root, at, removed.item.clone())?;
                Ok::<_, TreeError>(UndoAction::AddToFolder {
                    folder_id: folder_id.clone(),
                    item: removed.item,
                    index: *index,
                })
            }),

            UndoAction::RemoveFromFolder {
                parent,
                folder_before,
                folder_index,
                item_id,
                dissolution,
            } => self.tree.transaction(|draft| {
                draft.remove_by_id(&ParentRef::Root, item_id)?;
                match dissolution {
                    None => {
                        draft.replace_in_place(parent, &folder_before.id, folder_before.clone())?;
                    }
                    Some(Dissolution::Collapsed { survivor_id, .. }) => {
                        draft.replace_in_place(parent, survivor_id, folder_before.clone())?;
                    }
                    Some(Dissolution::Removed { .. }) => {
                        let at = (*folder_index).min(draft.siblings(parent)?.len());
                        draft.insert_at(parent, at, folder_before.clone())?;
                    }
                }
                Ok::<_, TreeError>(action.clone())
            }),
        }
    }

    /// Redo one action; returns the action to store on the undo stack
    fn reapply(&mut self, action: &UndoAction) -> Result<UndoAction, TreeError> {
        match action {
            UndoAction::CreateFolder {
                folder,
                folder_index,
                originals,
            } => {
                self.tree.transaction(|draft| {
                    for (_, original) in originals {
                        draft.remove_by_id(&ParentRef::Root, &original.id)?;
                    }
                    let at = (*folder_index).min(draft.len());
                    draft.insert_at(&ParentRef::Root, at, folder.clone())
                })?;
                Ok(action.clone())
            }

            UndoAction::AddToFolder {
                folder_id,
                item,
                index,
            } => self.tree.transaction(|draft| {
                let removed = draft.remove_by_id(&ParentRef::Root, &item.id)?;
                draft.push(&ParentRef::folder(folder_id.as_str()), removed.item.clone())?;
                Ok::<_, TreeError>(UndoAction::AddToFolder {
                    folder_id: folder_id.clone(),
                    item: removed.item,
                    index: *index,
                })
            }),

            UndoAction::RemoveFromFolder {
                folder_before,
                item_id,
                ..
            } => self.apply_remove_from_folder(item_id, &folder_before.id),
        }
    }

    /// Change the name shown under an item
    pub fn rename_item(&mut self, id: &str, name: &str) -> Result<Outcome, TreeError> {
        let name = name.trim();
        let item = self
            .tree
            .get_mut(id)
            .ok_or_else(|| TreeError::NotFound(id.to_string()))?;
        if name.is_empty() || item.display_name == name {
            return Ok(Outcome::Unchanged);
        }

        item.display_name = name.to_string();
        tracing::info!(id = %id, name = %name, "Renamed item");
        self.mark_changed();
        Ok(Outcome::Updated)
    }

    /// Switch a folder between preview grid and collapsed icon
    pub fn set_folder_enlarged(&mut self, folder_id: &str, enlarged: bool) -> Result<Outcome, TreeError> {
        let folder = self
            .tree
            .get_mut(folder_id)
            .ok_or_else(|| TreeError::NotFound(folder_id.to_string()))?;
        let ItemKind::Folder { enlarged: current, .. } = &mut folder.kind else {
            return Err(TreeError::NotAFolder(folder_id.to_string()));
        };
        if *current == enlarged {
            return Ok(Outcome::Unchanged);
        }

        *current = enlarged;
        self.mark_changed();
        Ok(Outcome::Updated)
    }

    /// Append a newly discovered desktop entry unless it is already known
    pub fn adopt(&mut self, item: Item) -> Result<Outcome, TreeError> {
        if self.tree.contains(&item.id) {
            return Ok(Outcome::Unchanged);
        }
        tracing::info!(id = %item.id, "New desktop item");
        self.tree.push(&ParentRef::Root, item)?;
        self.mark_changed();
        Ok(Outcome::Updated)
    }

    /// Drop an item whose desktop entry vanished
    ///
    /// Recorded actions may refer to it, so the history is cleared.
    pub fn forget(&mut self, id: &str) -> Result<Outcome, TreeError> {
        let Some(located) = self.tree.find_by_id(id) else {
            return Ok(Outcome::Unchanged);
        };
        let parent = located.parent();

        self.tree.remove_by_id(&parent, id)?;
        self.history.clear();
        tracing::info!(id = %id, "Desktop item removed");
        self.mark_changed();
        Ok(Outcome::Updated)
    }

    /// Replace the whole tree (layout reload); history does not survive
    pub fn replace_tree(&mut self, items: Vec<Item>) {
        self.tree = ItemTree::rehydrate(items);
        self.history.clear();
        self.mark_changed();
    }
}
