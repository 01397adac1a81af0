//! SmartDesktop
//!
//! Desktop icon organizer: drop one item on another to group them into a
//! virtual folder, name folders from their content, undo and redo every
//! grouping, and keep the layout across restarts.

pub mod commands;
pub mod icons;
pub mod layout;
pub mod logging;
pub mod models;
pub mod naming;
pub mod organizer;
pub mod services;
pub mod tree;

use std::sync::Arc;

use commands::{AppState, CommandError};
use services::settings::{default_settings_path, load_settings};

/// Load settings, restore the desktop and serve until Ctrl-C
pub async fn run() -> Result<(), CommandError> {
    let settings_path = default_settings_path()?;
    let settings = load_settings(&settings_path);
    logging::init(settings.advanced.debug_logging);

    tracing::info!("Starting SmartDesktop v{}", env!("CARGO_PKG_VERSION"));

    let watch_desktop = settings.general.watch_desktop;
    let state = Arc::new(AppState::bootstrap(settings, Some(settings_path)).await?);

    if watch_desktop {
        if let Err(e) = state.start_watcher() {
            tracing::warn!(error = %e, "Desktop watcher unavailable, continuing without it");
        }
    }

    let resolved = state.prefetch_icons(None).await;
    let summary = state.summary().await;
    tracing::info!(
        desktop = %summary.desktop_dir,
        items = summary.top_level,
        folders = summary.folders,
        size = %summary.total_size,
        icons = resolved,
        "Desktop ready"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }

    tracing::info!("Shutting down");
    state.stop_watcher();
    state.shutdown().await
}
