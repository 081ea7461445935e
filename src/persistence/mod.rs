// Snapshot scheduling for the aggregator
// Restores the store at startup and saves it in the background

use crate::storage::MetricStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Seed the store from disk before any request is served
///
/// A corrupt snapshot is logged and the server starts empty; the broken
/// file is left in place until the next save overwrites it.
pub fn restore_on_startup(store: &MetricStore, restore: bool) {
    if !restore {
        info!("Snapshot restore disabled, starting with an empty store");
        return;
    }
    if let Err(e) = store.load_from_file() {
        error!(error = %e, "Failed to restore snapshot, starting with an empty store");
    }
}

/// Save the store once, off the async runtime
pub async fn save_now(store: Arc<MetricStore>) {
    match tokio::task::spawn_blocking(move || store.save_to_file()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Failed to save snapshot"),
        Err(e) => error!(error = %e, "Snapshot task panicked"),
    }
}

/// Background saver
///
/// With a non-zero interval the store is saved on every tick. With a zero
/// interval it is saved after writes, with bursts coalesced into one save.
pub struct Persister;

impl Persister {
    pub fn spawn(
        store: Arc<MetricStore>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        if store.file().is_none() {
            warn!("No snapshot file configured, background saving disabled");
        }

        tokio::spawn(async move {
            if interval.is_zero() {
                info!("Saving snapshot after every update");
                loop {
                    tokio::select! {
                        _ = store.changed() => save_now(store.clone()).await,
                        _ = shutdown.recv() => break,
                    }
                }
            } else {
                info!(interval_secs = interval.as_secs(), "Saving snapshot periodically");
                let mut ticker = interval_at(Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => save_now(store.clone()).await,
                        _ = shutdown.recv() => break,
                    }
                }
            }
            info!("Persister stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileStorage;
    use crate::signals::ShutdownCoordinator;
    use tempfile::TempDir;

    fn file_store(temp: &TempDir) -> Arc<MetricStore> {
        Arc::new(MetricStore::with_file(FileStorage::new(temp.path().join("metrics.json"))))
    }

    #[test]
    fn test_restore_corrupt_starts_empty() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("metrics.json"), "{{{").unwrap();

        let store = file_store(&temp);
        restore_on_startup(&store, true);
        assert!(store.snapshot_all().is_empty());
    }

    #[test]
    fn test_restore_disabled() {
        let temp = TempDir::new().unwrap();
        let seeded = file_store(&temp);
        seeded.set_gauge("Alloc", 1.0);
        seeded.save_to_file().unwrap();

        let store = file_store(&temp);
        restore_on_startup(&store, false);
        assert!(store.snapshot_all().is_empty());

        restore_on_startup(&store, true);
        assert_eq!(store.get_gauge("Alloc").unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_save_now_survives_io_failure() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let store = Arc::new(MetricStore::with_file(FileStorage::new(blocker.join("metrics.json"))));
        store.add_counter("Hits", 2);

        save_now(store.clone()).await;

        assert_eq!(store.get_counter("Hits").unwrap(), 2);
        assert!(!blocker.join("metrics.json").exists());
    }

    #[tokio::test]
    async fn test_sync_mode_saves_after_update() {
        let temp = TempDir::new().unwrap();
        let store = file_store(&temp);
        let coordinator = ShutdownCoordinator::new();
        let handle = Persister::spawn(store.clone(), Duration::ZERO, coordinator.subscribe());

        store.add_counter("Hits", 4);

        let path = temp.path().join("metrics.json");
        let storage = FileStorage::new(&path);
        let mut saved = false;
        for _ in 0..100 {
            if storage.load().map(|s| s.counters.get("Hits") == Some(&4)).unwrap_or(false) {
                saved = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(saved);

        coordinator.trigger();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_mode_saves_on_tick() {
        let temp = TempDir::new().unwrap();
        let store = file_store(&temp);
        store.set_gauge("Alloc", 2.5);
        let coordinator = ShutdownCoordinator::new();
        let handle = Persister::spawn(store.clone(), Duration::from_secs(300), coordinator.subscribe());

        let path = temp.path().join("metrics.json");
        assert!(!path.exists());

        tokio::time::sleep(Duration::from_secs(301)).await;
        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::task::yield_now().await;
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(path.exists());

        coordinator.trigger();
        handle.await.unwrap();
    }
}
