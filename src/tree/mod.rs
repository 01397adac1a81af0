//! Desktop Item Tree
//!
//! The authoritative in-memory hierarchy of desktop items and folders.
//! Lookups are by id only. Mutation primitives keep the structural
//! invariants: sibling ids are unique, and a folder that drops to one child
//! collapses into that child while an emptied folder disappears.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::Item;

/// Structural errors; a failed operation leaves the tree untouched
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "details")]
pub enum TreeError {
    /// The id is absent from the searched level(s)
    #[error("Item not found: {0}")]
    NotFound(String),

    /// Inserting would put two nodes with the same id under one parent
    #[error("Duplicate id {id} under {parent}")]
    DuplicateId { id: String, parent: String },

    /// Position outside `0..=len`
    #[error("Invalid index {index} (length {len})")]
    InvalidIndex { index: usize, len: usize },

    /// A container operation was aimed at a leaf
    #[error("Not a folder: {0}")]
    NotAFolder(String),
}

/// Which sibling sequence an operation targets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentRef {
    /// The top-level desktop sequence
    Root,
    /// The children of the folder with this id
    Folder(String),
}

impl ParentRef {
    pub fn folder(id: impl Into<String>) -> Self {
        ParentRef::Folder(id.into())
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentRef::Root => write!(f, "desktop"),
            ParentRef::Folder(id) => write!(f, "{}", id),
        }
    }
}

/// A node found by [`ItemTree::find_by_id`]
#[derive(Debug, Clone, Copy)]
pub struct Located<'a> {
    pub item: &'a Item,
    /// Folder id holding the node, `None` at top level
    pub parent_id: Option<&'a str>,
    /// Position among its siblings
    pub index: usize,
}

impl Located<'_> {
    pub fn parent(&self) -> ParentRef {
        match self.parent_id {
            Some(id) => ParentRef::folder(id),
            None => ParentRef::Root,
        }
    }
}

/// What the automatic dissolve check did to a folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dissolution {
    /// The folder was replaced by its single remaining child
    Collapsed {
        folder_id: String,
        survivor_id: String,
        index: usize,
    },
    /// The folder was emptied and removed
    Removed { folder_id: String, index: usize },
}

/// Result of [`ItemTree::remove_by_id`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub item: Item,
    /// Original position among its siblings
    pub index: usize,
    pub dissolution: Option<Dissolution>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemTree {
    items: Vec<Item>,
}

impl ItemTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from loaded items, repairing anything that violates
    /// the structural invariants
    pub fn rehydrate(items: Vec<Item>) -> Self {
        Self {
            items: normalize_level(items, "desktop"),
        }
    }

    /// The top-level sequence
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Exact id lookup over the top level and one level of folder children
    pub fn find_by_id(&self, id: &str) -> Option<Located<'_>> {
        for (index, item) in self.items.iter().enumerate() {
            if item.id == id {
                return Some(Located {
                    item,
                    parent_id: None,
                    index,
                });
            }
        }

        for folder in &self.items {
            if let Some(children) = folder.children() {
                if let Some(index) = children.iter().position(|c| c.id == id) {
                    return Some(Located {
                        item: &children[index],
                        parent_id: Some(folder.id.as_str()),
                        index,
                    });
                }
            }
        }

        None
    }

    /// Position of `id` in the top-level sequence
    pub fn top_level_index(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    /// Whether `id` is anywhere within lookup depth
    pub fn contains(&self, id: &str) -> bool {
        self.find_by_id(id).is_some()
    }

    /// Children of `parent`
    pub fn siblings(&self, parent: &ParentRef) -> Result<&[Item], TreeError> {
        match parent {
            ParentRef::Root => Ok(self.items.as_slice()),
            ParentRef::Folder(folder_id) => {
                let located = self
                    .find_by_id(folder_id)
                    .ok_or_else(|| TreeError::NotFound(folder_id.clone()))?;
                located
                    .item
                    .children()
                    .ok_or_else(|| TreeError::NotAFolder(folder_id.clone()))
            }
        }
    }

    fn siblings_mut(&mut self, parent: &ParentRef) -> Result<&mut Vec<Item>, TreeError> {
        match parent {
            ParentRef::Root => Ok(&mut self.items),
            ParentRef::Folder(folder_id) => {
                let folder = self
                    .get_mut(folder_id)
                    .ok_or_else(|| TreeError::NotFound(folder_id.clone()))?;
                folder
                    .children_mut()
                    .ok_or_else(|| TreeError::NotAFolder(folder_id.clone()))
            }
        }
    }

    /// Mutable access to a node within lookup depth
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Item> {
        let (parent_index, index) = {
            let located = self.find_by_id(id)?;
            let parent_index = match located.parent_id {
                Some(parent_id) => Some(self.top_level_index(parent_id)?),
                None => None,
            };
            (parent_index, located.index)
        };

        match parent_index {
            None => self.items.get_mut(index),
            Some(parent_index) => self.items[parent_index]
                .children_mut()
                .and_then(|children| children.get_mut(index)),
        }
    }

    /// Insert `item` at `index` among the children of `parent`
    pub fn insert_at(&mut self, parent: &ParentRef, index: usize, item: Item) -> Result<(), TreeError> {
        let siblings = self.siblings_mut(parent)?;

        if index > siblings.len() {
            return Err(TreeError::InvalidIndex {
                index,
                len: siblings.len(),
            });
        }
        if siblings.iter().any(|s| s.id == item.id) {
            return Err(TreeError::DuplicateId {
                id: item.id,
                parent: parent.to_string(),
            });
        }

        siblings.insert(index, item);
        Ok(())
    }

    /// Append `item` at the end of `parent`'s children
    pub fn push(&mut self, parent: &ParentRef, item: Item) -> Result<(), TreeError> {
        let len = self.siblings(parent)?.len();
        self.insert_at(parent, len, item)
    }

    /// Remove `id` from `parent`'s children
    ///
    /// When `parent` is a folder the dissolve check runs once afterwards:
    /// one remaining child takes the folder's slot, zero removes the folder.
    /// The check never climbs further than the folder's own parent.
    pub fn remove_by_id(&mut self, parent: &ParentRef, id: &str) -> Result<Removed, TreeError> {
        let index = self
            .siblings(parent)?
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| TreeError::NotFound(id.to_string()))?;

        let folder_id = match parent {
            ParentRef::Root => {
                let item = self.items.remove(index);
                return Ok(Removed {
                    item,
                    index,
                    dissolution: None,
                });
            }
            ParentRef::Folder(folder_id) => folder_id.clone(),
        };

        let (grandparent, folder_index, remaining) = {
            let located = self
                .find_by_id(&folder_id)
                .ok_or_else(|| TreeError::NotFound(folder_id.clone()))?;
            let remaining = located.item.children().map(|c| c.len()).unwrap_or(0) - 1;
            (located.parent(), located.index, remaining)
        };

        // A collapsing survivor must not collide with the folder's siblings
        if remaining == 1 {
            let survivor_id = self
                .siblings(parent)?
                .iter()
                .find(|s| s.id != id)
                .map(|s| s.id.clone())
                .unwrap_or_default();
            let collides = self
                .siblings(&grandparent)?
                .iter()
                .any(|s| s.id == survivor_id && s.id != folder_id);
            if collides {
                return Err(TreeError::DuplicateId {
                    id: survivor_id,
                    parent: grandparent.to_string(),
                });
            }
        }

        let item = self.siblings_mut(parent)?.remove(index);

        let dissolution = match remaining {
            0 => {
                self.siblings_mut(&grandparent)?.remove(folder_index);
                Some(Dissolution::Removed {
                    folder_id,
                    index: folder_index,
                })
            }
            1 => {
                let survivor = self
                    .siblings_mut(parent)?
                    .pop()
                    .ok_or_else(|| TreeError::NotFound(folder_id.clone()))?;
                let survivor_id = survivor.id.clone();
                self.siblings_mut(&grandparent)?[folder_index] = survivor;
                Some(Dissolution::Collapsed {
                    folder_id,
                    survivor_id,
                    index: folder_index,
                })
            }
            _ => None,
        };

        Ok(Removed {
            item,
            index,
            dissolution,
        })
    }

    /// Swap the node `id` for `new_item`, keeping its slot
    ///
    /// Returns the replaced node.
    pub fn replace_in_place(&mut self, parent: &ParentRef, id: &str, new_item: Item) -> Result<Item, TreeError> {
        let siblings = self.siblings_mut(parent)?;
        let index = siblings
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| TreeError::NotFound(id.to_string()))?;

        if new_item.id != id && siblings.iter().any(|s| s.id == new_item.id) {
            return Err(TreeError::DuplicateId {
                id: new_item.id,
                parent: parent.to_string(),
            });
        }

        Ok(std::mem::replace(&mut siblings[index], new_item))
    }

    /// List-move within one sibling sequence: the node ends up at `to`
    pub fn move_within(&mut self, parent: &ParentRef, from: usize, to: usize) -> Result<(), TreeError> {
        let siblings = self.siblings_mut(parent)?;
        let len = siblings.len();
        if from >= len {
            return Err(TreeError::InvalidIndex { index: from, len });
        }
        if to >= len {
            return Err(TreeError::InvalidIndex { index: to, len });
        }

        let item = siblings.remove(from);
        siblings.insert(to, item);
        Ok(())
    }

    /// Run `f` against a draft copy and keep the result only on success
    pub fn transaction<T, E>(&mut self, f: impl FnOnce(&mut ItemTree) -> Result<T, E>) -> Result<T, E> {
        let mut draft = self.clone();
        let out = f(&mut draft)?;
        *self = draft;
        Ok(out)
    }

    /// Paths of every leaf in the tree
    pub fn leaf_paths(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for item in &self.items {
            item.leaf_paths(&mut out);
        }
        out
    }
}

/// Collapse degenerate folders and drop duplicate ids, bottom-up
fn normalize_level(items: Vec<Item>, level: &str) -> Vec<Item> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());

    for mut item in items {
        let folder_id = item.id.clone();
        let mut collapse_to = None;
        if let Some(children) = item.children_mut() {
            *children = normalize_level(std::mem::take(children), &folder_id);

            match children.len() {
                0 => {
                    tracing::debug!(folder_id = %folder_id, "Dropping empty folder from layout");
                    continue;
                }
                1 => {
                    tracing::debug!(folder_id = %folder_id, "Collapsing single-item folder from layout");
                    collapse_to = children.pop();
                }
                _ => {}
            }
        }
        if let Some(only) = collapse_to {
            item = only;
        }

        if !seen.insert(item.id.clone()) {
            tracing::warn!(id = %item.id, parent = %level, "Dropping duplicate item from layout");
            continue;
        }
        out.push(item);
    }

    out
}
