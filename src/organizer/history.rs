use std::collections::VecDeque;

use crate::models::Item;
use crate::tree::{Dissolution, ParentRef};

/// Everything needed to invert one grouping action
///
/// Items are deep copies taken at the time of the action; indices are
/// positions among the siblings the item was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoAction {
    /// Two top-level items merged into a new folder
    CreateFolder {
        folder: Item,
        folder_index: usize,
        /// `(original index, original item)` in `[source, target]` order
        originals: Vec<(usize, Item)>,
    },
    /// A top-level item moved into an existing folder
    AddToFolder {
        folder_id: String,
        item: Item,
        index: usize,
    },
    /// An item taken out of a folder onto the desktop
    RemoveFromFolder {
        parent: ParentRef,
        folder_before: Item,
        folder_index: usize,
        item_id: String,
        dissolution: Option<Dissolution>,
    },
}

impl UndoAction {
    pub fn label(&self) -> &'static str {
        match self {
            UndoAction::CreateFolder { .. } => "create folder",
            UndoAction::AddToFolder { .. } => "add to folder",
            UndoAction::RemoveFromFolder { .. } => "remove from folder",
        }
    }
}

/// Bounded undo stack plus redo stack
#[derive(Debug, Clone)]
pub struct UndoHistory {
    undo: VecDeque<UndoAction>,
    redo: Vec<UndoAction>,
    depth: usize,
}

impl UndoHistory {
    /// History keeping at most `depth` undo entries
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    /// Record a fresh user action; invalidates redo
    pub fn record(&mut self, action: UndoAction) {
        self.push_undo(action);
        self.redo.clear();
    }

    /// Push onto undo without touching redo (used by redo itself)
    pub fn push_undo(&mut self, action: UndoAction) {
        self.undo.push_back(action);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
    }

    pub fn pop_undo(&mut self) -> Option<UndoAction> {
        self.undo.pop_back()
    }

    pub fn push_redo(&mut self, action: UndoAction) {
        self.redo.push(action);
    }

    pub fn pop_redo(&mut self) -> Option<UndoAction> {
        self.redo.pop()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Change the cap; the oldest entries go first
    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth.max(1);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
    }
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(20)
    }
}
