pub mod discovery;
pub mod file_ops;
pub mod settings;
pub mod watcher;

pub use discovery::{discover_desktop, reconcile};
pub use file_ops::{move_files, FileOpError};
pub use settings::{load_settings, save_settings, SettingsError};
pub use watcher::{DesktopChange, DesktopWatcher, WatcherError};
