use std::path::PathBuf;
use std::sync::Arc;

use super::{AppState, CommandError};
use crate::icons::{clamp_icon_size, CacheStats};

impl AppState {
    async fn icon_size(&self, requested: Option<u32>) -> u32 {
        let size = match requested {
            Some(size) if size > 0 => size,
            _ => self.settings.read().await.icons.icon_size,
        };
        clamp_icon_size(size)
    }

    /// Icon for `path` as a PNG data URL, `None` when nothing resolves
    pub async fn get_icon(&self, path: String, size: Option<u32>) -> Result<Option<String>, CommandError> {
        let size = self.icon_size(size).await;
        let Some(icon) = self.icons.resolve_async(PathBuf::from(path), size).await else {
            return Ok(None);
        };

        let url = tokio::task::spawn_blocking(move || icon.to_data_url())
            .await?
            .map_err(|e| CommandError::Icons(e.to_string()))?;
        Ok(Some(url))
    }

    /// Warm the icon caches for every leaf in the layout
    pub async fn prefetch_icons(&self, size: Option<u32>) -> usize {
        let size = self.icon_size(size).await;
        let paths = self.engine().await.tree().leaf_paths();
        self.icons.prefetch(paths, size).await
    }

    /// Drop memoized icons and delete the on-disk cache
    pub async fn clear_icon_cache(&self) -> Result<u64, CommandError> {
        self.icons.invalidate_all();
        let icons = Arc::clone(&self.icons);
        let removed = tokio::task::spawn_blocking(move || match icons.disk_cache() {
            Some(cache) => cache.clear(),
            None => Ok(0),
        })
        .await??;
        Ok(removed)
    }

    /// Disk cache statistics, `None` when the disk cache is disabled
    pub async fn get_icon_cache_stats(&self) -> Result<Option<CacheStats>, CommandError> {
        let icons = Arc::clone(&self.icons);
        let stats = tokio::task::spawn_blocking(move || icons.disk_cache().map(|cache| cache.stats()).transpose())
            .await??;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::test_support::create_test_state;
    use crate::icons::MAX_ICON_SIZE;
    use crate::models::Item;
    use image::{Rgba, RgbaImage};

    #[tokio::test]
    async fn test_get_icon_returns_data_url_for_images() {
        let (state, _store, dir) = create_test_state(Vec::new());
        let path = dir.path().join("photo.png");
        RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255])).save(&path).unwrap();

        let url = state
            .get_icon(path.to_string_lossy().to_string(), Some(16))
            .await
            .unwrap()
            .unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_get_icon_huge_size_is_served_at_the_cap() {
        let (state, _store, dir) = create_test_state(Vec::new());
        let path = dir.path().join("photo.png");
        RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255])).save(&path).unwrap();

        let url = state
            .get_icon(path.to_string_lossy().to_string(), Some(100_000))
            .await
            .unwrap();
        assert!(url.is_some());

        let icon = state.icons().resolve(&path, MAX_ICON_SIZE).unwrap();
        assert_eq!(icon.dimensions(), (MAX_ICON_SIZE, MAX_ICON_SIZE));
    }

    #[tokio::test]
    async fn test_get_icon_missing_path_is_none() {
        let (state, _store, dir) = create_test_state(Vec::new());
        let path = dir.path().join("gone.png");
        assert_eq!(state.get_icon(path.to_string_lossy().to_string(), None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_prefetch_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])).save(&path).unwrap();

        let (state, _store, _state_dir) = create_test_state(vec![Item::leaf("a.png", &path, 1)]);
        assert_eq!(state.prefetch_icons(Some(8)).await, 1);
        assert_eq!(state.icons().cached_len(), 1);

        assert_eq!(state.clear_icon_cache().await.unwrap(), 0);
        assert_eq!(state.icons().cached_len(), 0);
        assert_eq!(state.get_icon_cache_stats().await.unwrap(), None);
    }
}
