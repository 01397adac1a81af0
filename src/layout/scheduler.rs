//! Debounced layout saves
//!
//! Every tree change schedules a save after a quiescence window. A new
//! request cancels the pending one, so a burst of changes produces a single
//! write of the latest snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{LayoutError, LayoutStore};
use crate::models::LayoutSnapshot;

pub struct SaveScheduler {
    store: Arc<dyn LayoutStore>,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    /// Generation of the newest snapshot on disk
    written: Arc<Mutex<u64>>,
}

impl SaveScheduler {
    pub fn new(store: Arc<dyn LayoutStore>, delay: Duration) -> Self {
        Self {
            store,
            delay,
            pending: Mutex::new(None),
            generation: AtomicU64::new(0),
            written: Arc::new(Mutex::new(0)),
        }
    }

    pub fn store(&self) -> &Arc<dyn LayoutStore> {
        &self.store
    }

    fn cancel_pending(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = pending.take() {
            task.abort();
        }
    }

    /// Save `snapshot` once no newer request arrives within the delay
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, snapshot: LayoutSnapshot) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let store = Arc::clone(&self.store);
        let written = Arc::clone(&self.written);
        let delay = self.delay;

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = pending.take() {
            task.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = write(store, written, generation, snapshot).await {
                // The next scheduled save writes the full tree again
                tracing::warn!(error = %e, "Layout save failed");
            }
        }));
    }

    /// Save `snapshot` now, dropping any pending save
    pub async fn flush(&self, snapshot: LayoutSnapshot) -> Result<(), LayoutError> {
        self.cancel_pending();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        write(Arc::clone(&self.store), Arc::clone(&self.written), generation, snapshot).await
    }
}

impl Drop for SaveScheduler {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

/// Write on the blocking pool unless a newer generation already landed
async fn write(
    store: Arc<dyn LayoutStore>,
    written: Arc<Mutex<u64>>,
    generation: u64,
    snapshot: LayoutSnapshot,
) -> Result<(), LayoutError> {
    let task = tokio::task::spawn_blocking(move || -> Result<(), LayoutError> {
        let mut newest = written.lock().unwrap_or_else(PoisonError::into_inner);
        if *newest > generation {
            tracing::debug!(generation, newest = *newest, "Skipping stale layout save");
            return Ok(());
        }
        store.save(&snapshot)?;
        *newest = generation;
        Ok(())
    });

    match task.await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(error = %e, "Layout save task failed");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::memory::MemoryLayoutStore;
    use crate::models::Item;

    fn snapshot(names: &[&str]) -> LayoutSnapshot {
        let items: Vec<Item> = names
            .iter()
            .map(|n| Item::leaf(*n, format!("/desk/{}", n), 1))
            .collect();
        LayoutSnapshot::capture(&items)
    }

    #[tokio::test]
    async fn test_burst_coalesces_into_latest_save() {
        let store = Arc::new(MemoryLayoutStore::default());
        let scheduler = SaveScheduler::new(store.clone(), Duration::from_millis(50));

        scheduler.schedule(snapshot(&["a"]));
        scheduler.schedule(snapshot(&["a", "b"]));
        scheduler.schedule(snapshot(&["a", "b", "c"]));

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(store.save_count(), 1);
        assert_eq!(store.last().unwrap().items.len(), 3);
    }

    #[tokio::test]
    async fn test_flush_cancels_pending() {
        let store = Arc::new(MemoryLayoutStore::default());
        let scheduler = SaveScheduler::new(store.clone(), Duration::from_millis(50));

        scheduler.schedule(snapshot(&["old"]));
        scheduler.flush(snapshot(&["new", "er"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.save_count(), 1);
        assert_eq!(store.last().unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn test_stale_generation_is_skipped() {
        let store: Arc<dyn LayoutStore> = Arc::new(MemoryLayoutStore::default());
        let written = Arc::new(Mutex::new(5));

        write(store.clone(), written.clone(), 3, snapshot(&["stale"])).await.unwrap();
        assert!(store.load().unwrap().is_empty());

        write(store.clone(), written.clone(), 6, snapshot(&["fresh"])).await.unwrap();
        assert_eq!(store.load().unwrap().items.len(), 1);
        assert_eq!(*written.lock().unwrap(), 6);
    }
}
