use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use super::discovery::{is_ignored, leaf_for};
use crate::models::Item;

/// Waits for file writes to settle before reporting
const DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    Create(#[source] notify::Error),

    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: String,
        #[source]
        source: notify::Error,
    },
}

/// A desktop entry appeared or disappeared
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesktopChange {
    Added(Item),
    Removed(PathBuf),
}

/// Watches the desktop directory (non-recursive) while alive
pub struct DesktopWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    dir: PathBuf,
}

impl DesktopWatcher {
    /// Start watching `dir`, sending changes to `tx`
    pub fn start(dir: &Path, tx: UnboundedSender<DesktopChange>) -> Result<Self, WatcherError> {
        let mut debouncer = new_debouncer(
            DEBOUNCE,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    for event in events {
                        for change in changes_for(&event) {
                            if tx.send(change).is_err() {
                                // Receiver gone, the app is shutting down
                                return;
                            }
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::warn!(error = ?error, "Desktop watcher error");
                    }
                }
            },
        )
        .map_err(WatcherError::Create)?;

        debouncer
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatcherError::Watch {
                path: dir.display().to_string(),
                source,
            })?;

        tracing::info!(dir = %dir.display(), "Watching desktop");
        Ok(Self {
            _debouncer: debouncer,
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Translate one filesystem event into desktop changes
///
/// Renames and ambiguous events are settled by checking whether the path
/// still exists.
pub fn changes_for(event: &Event) -> Vec<DesktopChange> {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    );
    if !relevant {
        return Vec::new();
    }

    let renamed_both = matches!(event.kind, EventKind::Modify(ModifyKind::Name(RenameMode::Both)));

    event
        .paths
        .iter()
        .enumerate()
        .filter(|(_, path)| !is_ignored(path))
        .filter_map(|(i, path)| {
            let gone = matches!(event.kind, EventKind::Remove(_)) || (renamed_both && i == 0) || !path.exists();
            if gone {
                Some(DesktopChange::Removed(path.clone()))
            } else {
                leaf_for(path).map(DesktopChange::Added)
            }
        })
        .collect()
}
