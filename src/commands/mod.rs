//! The surface the desktop shell calls
//!
//! Every command is an async method on [`AppState`]. Tree mutations and the
//! save they trigger happen under one engine lock.

pub mod desktop;
pub mod icons;
pub mod organize;

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::icons::{CacheError, FreedesktopPlatform, IconDiskCache, IconResolver};
use crate::layout::{JsonLayoutStore, LayoutError, LayoutStore, SaveScheduler};
use crate::models::AppSettings;
use crate::naming::{CategoryClassifier, CategoryTables};
use crate::organizer::{EnginePolicy, OrganizationEngine, Outcome};
use crate::services::{discovery, DesktopWatcher, FileOpError, SettingsError, WatcherError};
use crate::tree::{ItemTree, TreeError};

pub type DesktopIcons = IconResolver<FreedesktopPlatform>;

/// Error returned to the shell
#[derive(Debug, Error, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "details")]
pub enum CommandError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Layout error: {0}")]
    Layout(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("File operation failed: {0}")]
    FileOp(String),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Icon cache error: {0}")]
    Icons(String),

    #[error("Could not determine the desktop directory")]
    NoDesktopDir,

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<LayoutError> for CommandError {
    fn from(e: LayoutError) -> Self {
        CommandError::Layout(e.to_string())
    }
}

impl From<SettingsError> for CommandError {
    fn from(e: SettingsError) -> Self {
        CommandError::Settings(e.to_string())
    }
}

impl From<FileOpError> for CommandError {
    fn from(e: FileOpError) -> Self {
        CommandError::FileOp(e.to_string())
    }
}

impl From<WatcherError> for CommandError {
    fn from(e: WatcherError) -> Self {
        CommandError::Watcher(e.to_string())
    }
}

impl From<CacheError> for CommandError {
    fn from(e: CacheError) -> Self {
        CommandError::Icons(e.to_string())
    }
}

impl From<tokio::task::JoinError> for CommandError {
    fn from(e: tokio::task::JoinError) -> Self {
        CommandError::Task(e.to_string())
    }
}

/// Shared application state
pub struct AppState {
    engine: Arc<Mutex<OrganizationEngine>>,
    icons: Arc<DesktopIcons>,
    saver: SaveScheduler,
    settings: RwLock<AppSettings>,
    settings_path: Option<PathBuf>,
    desktop_dir: PathBuf,
    watcher: std::sync::Mutex<Option<DesktopWatcher>>,
}

impl AppState {
    /// Load everything the app needs from `settings`
    ///
    /// Restores the saved layout, or discovers the desktop when none is
    /// stored, then appends entries that appeared since the last run.
    pub async fn bootstrap(settings: AppSettings, settings_path: Option<PathBuf>) -> Result<Self, CommandError> {
        let desktop_dir = settings
            .paths
            .desktop_dir
            .clone()
            .or_else(discovery::default_desktop_dir)
            .ok_or(CommandError::NoDesktopDir)?;
        let layout_file = settings
            .paths
            .layout_file
            .clone()
            .or_else(JsonLayoutStore::default_path)
            .ok_or_else(|| CommandError::Layout("Could not determine the layout location".to_string()))?;

        let store: Arc<dyn LayoutStore> = Arc::new(JsonLayoutStore::new(layout_file));
        let tree = {
            let store = Arc::clone(&store);
            let dir = desktop_dir.clone();
            tokio::task::spawn_blocking(move || load_tree(store.as_ref(), &dir)).await??
        };

        let classifier = CategoryClassifier::new(load_tables(settings.paths.category_tables.as_deref()));
        let engine = OrganizationEngine::new(tree, classifier, EnginePolicy::from_settings(&settings));

        let mut icons = IconResolver::new(FreedesktopPlatform::new(settings.icons.theme_dirs.clone()));
        if settings.icons.cache_icons {
            if let Some(dir) = settings.paths.icon_cache_dir.clone().or_else(IconDiskCache::default_dir) {
                icons = icons.with_disk_cache(IconDiskCache::new(dir));
            }
        }

        tracing::info!(desktop = %desktop_dir.display(), "SmartDesktop state ready");
        Ok(Self::from_parts(engine, icons, store, settings, settings_path, desktop_dir))
    }

    pub fn from_parts(
        engine: OrganizationEngine,
        icons: DesktopIcons,
        store: Arc<dyn LayoutStore>,
        settings: AppSettings,
        settings_path: Option<PathBuf>,
        desktop_dir: PathBuf,
    ) -> Self {
        let delay = Duration::from_millis(settings.general.save_debounce_ms);
        Self {
            engine: Arc::new(Mutex::new(engine)),
            icons: Arc::new(icons),
            saver: SaveScheduler::new(store, delay),
            settings: RwLock::new(settings),
            settings_path,
            desktop_dir,
            watcher: std::sync::Mutex::new(None),
        }
    }

    pub fn desktop_dir(&self) -> &Path {
        &self.desktop_dir
    }

    pub fn icons(&self) -> &Arc<DesktopIcons> {
        &self.icons
    }

    pub async fn engine(&self) -> MutexGuard<'_, OrganizationEngine> {
        self.engine.lock().await
    }

    /// Apply `f` and schedule a save when it changed the tree
    async fn mutate<F>(&self, f: F) -> Result<Outcome, CommandError>
    where
        F: FnOnce(&mut OrganizationEngine) -> Result<Outcome, TreeError>,
    {
        let mut engine = self.engine.lock().await;
        let outcome = f(&mut engine)?;
        if outcome.is_change() {
            self.saver.schedule(engine.snapshot());
        }
        Ok(outcome)
    }

    /// Write the layout immediately (shutdown)
    pub async fn shutdown(&self) -> Result<(), CommandError> {
        let snapshot = self.engine.lock().await.snapshot();
        self.saver.flush(snapshot).await?;
        tracing::info!("Layout saved on shutdown");
        Ok(())
    }
}

fn load_tree(store: &dyn LayoutStore, desktop_dir: &Path) -> Result<ItemTree, LayoutError> {
    let snapshot = store.load()?;
    let discovered = discovery::discover_desktop(desktop_dir);

    if snapshot.is_empty() {
        return Ok(ItemTree::rehydrate(discovered));
    }

    let mut tree = ItemTree::rehydrate(snapshot.into_items());
    discovery::reconcile(&mut tree, discovered);
    Ok(tree)
}

fn load_tables(path: Option<&Path>) -> CategoryTables {
    let Some(path) = path else {
        return CategoryTables::builtin();
    };
    match CategoryTables::load(path) {
        Ok(tables) => tables,
        Err(e) => {
            tracing::warn!(error = %e, "Using built-in category tables");
            CategoryTables::builtin()
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Item, LayoutSnapshot};

    #[tokio::test]
    async fn test_bootstrap_discovers_then_restores() {
        let dir = tempfile::tempdir().unwrap();
        let desktop = dir.path().join("Desktop");
        std::fs::create_dir(&desktop).unwrap();
        std::fs::write(desktop.join("Steam.desktop"), "[Desktop Entry]\n").unwrap();
        std::fs::write(desktop.join("Xbox.desktop"), "[Desktop Entry]\n").unwrap();

        let mut settings = AppSettings::default();
        settings.paths.desktop_dir = Some(desktop.clone());
        settings.paths.layout_file = Some(dir.path().join("layout.json"));
        settings.icons.cache_icons = false;

        let state = AppState::bootstrap(settings.clone(), None).await.unwrap();
        assert_eq!(state.engine().await.tree().len(), 2);

        let outcome = state
            .create_folder(
                &desktop.join("Steam.desktop").to_string_lossy(),
                &desktop.join("Xbox.desktop").to_string_lossy(),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::FolderCreated { ref name, .. } if name == "Games"));
        state.shutdown().await.unwrap();

        std::fs::write(desktop.join("notes.txt"), "new").unwrap();
        let restored = AppState::bootstrap(settings, None).await.unwrap();
        let engine = restored.engine().await;
        assert_eq!(engine.tree().len(), 2);
        assert_eq!(engine.tree().items()[0].display_name, "Games");
        assert_eq!(engine.tree().items()[1].display_name, "notes.txt");
    }

    #[tokio::test]
    async fn test_failed_mutation_does_not_save() {
        let (state, store, _dir) = test_support::create_test_state(vec![
            Item::leaf("a", "/desk/a", 1),
            Item::leaf("b", "/desk/b", 1),
        ]);

        let result = state.create_folder("/desk/a", "/desk/missing").await;
        assert!(matches!(result, Err(CommandError::Tree(TreeError::NotFound(_)))));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_mutations_are_saved_debounced() {
        let (state, store, _dir) = test_support::create_test_state(vec![
            Item::leaf("a", "/desk/a", 1),
            Item::leaf("b", "/desk/b", 1),
            Item::leaf("c", "/desk/c", 1),
        ]);

        state.create_folder("/desk/a", "/desk/b").await.unwrap();
        state.move_item("/desk/c", "/desk/a").await.unwrap();
        state.undo().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.save_count(), 1);
        let saved: LayoutSnapshot = store.last().unwrap();
        assert_eq!(saved.items.len(), 3);
    }

    #[test]
    fn test_command_error_serializes_tagged() {
        let err = CommandError::from(TreeError::NotFound("x".to_string()));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "tree");
        assert_eq!(json["details"]["type"], "not_found");
    }
}
