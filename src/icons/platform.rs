//! Native icon lookup capability
//!
//! Each strategy is an independent fallible call. Whatever a platform hands
//! out as a native handle is owned by a [`NativeHandle`] guard from the
//! moment it is obtained, so it is released on every exit path.

use image::RgbaImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    #[error("Invalid shortcut {path}: {message}")]
    Shortcut { path: String, message: String },

    #[error("Stale icon handle {0}")]
    StaleHandle(u64),
}

impl PlatformError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        PlatformError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn decode(path: &Path, message: impl ToString) -> Self {
        PlatformError::Decode {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

/// Icon lookups offered by the operating system
///
/// Calls return `Ok(None)` when the strategy simply does not apply.
pub trait IconPlatform: Send + Sync + 'static {
    /// Native image handle; must be given back through [`release`](Self::release)
    type Handle;

    /// Whether `path` is a shortcut with its own icon and target
    fn is_shortcut(&self, path: &Path) -> bool;

    /// Extract the custom icon stored in a shortcut
    fn shortcut_icon(&self, path: &Path, size: u32) -> Result<Option<Self::Handle>, PlatformError>;

    /// Where a shortcut points
    fn shortcut_target(&self, path: &Path) -> Result<Option<PathBuf>, PlatformError>;

    /// High-quality image of the file itself
    fn shell_image(&self, path: &Path, size: u32) -> Result<Option<Self::Handle>, PlatformError>;

    /// Generic icon for the file's type
    fn file_type_icon(&self, path: &Path, size: u32) -> Result<Option<Self::Handle>, PlatformError>;

    /// Copy the pixels behind a handle
    fn to_rgba(&self, handle: &Self::Handle) -> Result<RgbaImage, PlatformError>;

    fn release(&self, handle: Self::Handle);
}

/// Owns a native handle and releases it on drop
pub struct NativeHandle<'a, P: IconPlatform + ?Sized> {
    platform: &'a P,
    handle: Option<P::Handle>,
}

impl<'a, P: IconPlatform + ?Sized> NativeHandle<'a, P> {
    pub fn new(platform: &'a P, handle: P::Handle) -> Self {
        Self {
            platform,
            handle: Some(handle),
        }
    }

    /// Convert into an owned image; the handle is released either way
    pub fn into_rgba(self) -> Result<RgbaImage, PlatformError> {
        match self.handle.as_ref() {
            Some(handle) => self.platform.to_rgba(handle),
            None => Err(PlatformError::StaleHandle(0)),
        }
    }
}

impl<P: IconPlatform + ?Sized> Drop for NativeHandle<'_, P> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.platform.release(handle);
        }
    }
}
