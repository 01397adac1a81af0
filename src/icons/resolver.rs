use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{imageops::FilterType, ImageFormat, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;

use super::cache::IconDiskCache;
use super::platform::{IconPlatform, NativeHandle, PlatformError};

/// Largest icon edge produced; bigger requests are served at this size
pub const MAX_ICON_SIZE: u32 = 256;

/// Requested edge length within `1..=MAX_ICON_SIZE`
pub fn clamp_icon_size(size: u32) -> u32 {
    size.clamp(1, MAX_ICON_SIZE)
}

/// An owned, shareable icon bitmap
#[derive(Debug, Clone, PartialEq)]
pub struct IconImage(Arc<RgbaImage>);

impl IconImage {
    /// Take ownership of `image`, scaled to `size`x`size` if needed
    pub fn new(image: RgbaImage, size: u32) -> Self {
        let size = clamp_icon_size(size);
        if image.dimensions() == (size, size) {
            return Self(Arc::new(image));
        }
        Self(Arc::new(image::imageops::resize(&image, size, size, FilterType::Lanczos3)))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.0
    }

    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Vec::new();
        self.0.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        Ok(buf)
    }

    /// `data:image/png;base64,...` for the shell
    pub fn to_data_url(&self) -> Result<String, image::ImageError> {
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(self.to_png()?)))
    }
}

/// One step of the lookup chain, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    ShortcutIcon,
    ShortcutTarget,
    ShellImage,
    FileTypeIcon,
}

impl Strategy {
    fn next(self) -> Option<Self> {
        match self {
            Strategy::ShortcutIcon => Some(Strategy::ShortcutTarget),
            Strategy::ShortcutTarget => Some(Strategy::ShellImage),
            Strategy::ShellImage => Some(Strategy::FileTypeIcon),
            Strategy::FileTypeIcon => None,
        }
    }
}

/// Progress of a single resolution request
#[derive(Debug)]
enum Resolution {
    Trying(Strategy),
    Resolved(IconImage),
    Failed,
}

type CacheKey = (PathBuf, u32);
type Slot = Arc<Mutex<Option<IconImage>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Produces icons for desktop paths
///
/// Successful results are memoized per `(path, size)`. Concurrent requests
/// for the same key wait on that key's slot instead of resolving twice;
/// different keys resolve in parallel.
pub struct IconResolver<P: IconPlatform> {
    platform: P,
    memory: Mutex<HashMap<CacheKey, Slot>>,
    disk: Option<IconDiskCache>,
    workers: Arc<Semaphore>,
}

impl<P: IconPlatform> IconResolver<P> {
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            memory: Mutex::new(HashMap::new()),
            disk: None,
            workers: Arc::new(Semaphore::new(num_cpus::get().max(1))),
        }
    }

    /// Also persist resolved icons as PNG files
    pub fn with_disk_cache(mut self, cache: IconDiskCache) -> Self {
        self.disk = Some(cache);
        self
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn disk_cache(&self) -> Option<&IconDiskCache> {
        self.disk.as_ref()
    }

    /// Number of memoized icons
    pub fn cached_len(&self) -> usize {
        let slots: Vec<Slot> = lock(&self.memory).values().cloned().collect();
        slots.iter().filter(|slot| lock(slot).is_some()).count()
    }

    /// Icon for `path`, or `None` when no strategy produced one
    ///
    /// `size` is clamped to [`MAX_ICON_SIZE`].
    pub fn resolve(&self, path: &Path, size: u32) -> Option<IconImage> {
        let size = clamp_icon_size(size);
        if !path.exists() && path.symlink_metadata().is_err() {
            tracing::debug!(path = %path.display(), "No icon for missing path");
            return None;
        }

        let key = (path.to_path_buf(), size);
        let slot = lock(&self.memory).entry(key.clone()).or_default().clone();

        let mut guard = lock(&slot);
        if let Some(icon) = guard.as_ref() {
            return Some(icon.clone());
        }

        let from_disk = self.disk.as_ref().and_then(|disk| disk.load(path, size));
        let icon = from_disk.or_else(|| {
            let icon = self.run_chain(path, size)?;
            if let Some(disk) = &self.disk {
                if let Err(e) = disk.store(path, size, &icon) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to cache icon on disk");
                }
            }
            Some(icon)
        });

        match icon {
            Some(icon) => {
                *guard = Some(icon.clone());
                Some(icon)
            }
            None => {
                drop(guard);
                self.evict_empty(&key, &slot);
                None
            }
        }
    }

    fn evict_empty(&self, key: &CacheKey, slot: &Slot) {
        let mut memory = lock(&self.memory);
        let is_ours = memory.get(key).map(|s| Arc::ptr_eq(s, slot)).unwrap_or(false);
        if is_ours && lock(slot).is_none() {
            memory.remove(key);
        }
    }

    /// Walk the strategy chain for one request
    fn run_chain(&self, path: &Path, size: u32) -> Option<IconImage> {
        let mut state = if self.platform.is_shortcut(path) {
            Resolution::Trying(Strategy::ShortcutIcon)
        } else {
            Resolution::Trying(Strategy::ShellImage)
        };

        loop {
            state = match state {
                Resolution::Resolved(icon) => return Some(icon),
                Resolution::Failed => {
                    tracing::debug!(path = %path.display(), "Icon strategies exhausted");
                    return None;
                }
                Resolution::Trying(strategy) => match self.attempt(strategy, path, size) {
                    Some(icon) => Resolution::Resolved(icon),
                    None => strategy.next().map(Resolution::Trying).unwrap_or(Resolution::Failed),
                },
            };
        }
    }

    fn attempt(&self, strategy: Strategy, path: &Path, size: u32) -> Option<IconImage> {
        let result = match strategy {
            Strategy::ShortcutIcon => self.platform.shortcut_icon(path, size),
            Strategy::ShortcutTarget => return self.resolve_target(path, size),
            Strategy::ShellImage => self.platform.shell_image(path, size),
            Strategy::FileTypeIcon => self.platform.file_type_icon(path, size),
        };
        self.convert(strategy, path, size, result)
    }

    /// Resolve a shortcut's target from the shell image strategy onward
    fn resolve_target(&self, path: &Path, size: u32) -> Option<IconImage> {
        let target = match self.platform.shortcut_target(path) {
            Ok(Some(target)) => target,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Shortcut target lookup failed");
                return None;
            }
        };
        if target == path || !target.exists() {
            return None;
        }

        [Strategy::ShellImage, Strategy::FileTypeIcon]
            .into_iter()
            .find_map(|strategy| self.attempt(strategy, &target, size))
    }

    /// Turn a native handle into an owned image, releasing the handle
    fn convert(
        &self,
        strategy: Strategy,
        path: &Path,
        size: u32,
        result: Result<Option<P::Handle>, PlatformError>,
    ) -> Option<IconImage> {
        let handle = match result {
            Ok(Some(handle)) => NativeHandle::new(&self.platform, handle),
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(path = %path.display(), ?strategy, error = %e, "Icon strategy failed");
                return None;
            }
        };

        match handle.into_rgba() {
            Ok(rgba) => Some(IconImage::new(rgba, size)),
            Err(e) => {
                tracing::debug!(path = %path.display(), ?strategy, error = %e, "Icon conversion failed");
                None
            }
        }
    }

    /// Forget every memoized icon (layout reload)
    pub fn invalidate_all(&self) {
        lock(&self.memory).clear();
    }

    /// Forget memoized icons for one path at every size
    pub fn invalidate_path(&self, path: &Path) {
        lock(&self.memory).retain(|(cached, _), _| cached != path);
    }
}

impl<P: IconPlatform> IconResolver<P> {
    /// Resolve on the blocking pool, bounded by the number of CPUs
    pub async fn resolve_async(self: &Arc<Self>, path: PathBuf, size: u32) -> Option<IconImage> {
        let permit = Arc::clone(&self.workers).acquire_owned().await.ok()?;
        let this = Arc::clone(self);

        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            this.resolve(&path, size)
        });

        match task.await {
            Ok(icon) => icon,
            Err(e) => {
                tracing::warn!(error = %e, "Icon resolution task failed");
                None
            }
        }
    }

    /// Resolve many paths concurrently; returns how many produced an icon
    pub async fn prefetch(self: &Arc<Self>, paths: Vec<PathBuf>, size: u32) -> usize {
        let total = paths.len();
        let resolved = futures::future::join_all(paths.into_iter().map(|path| self.resolve_async(path, size)))
            .await
            .into_iter()
            .filter(Option::is_some)
            .count();

        tracing::debug!(total, resolved, "Prefetched icons");
        resolved
    }
}
