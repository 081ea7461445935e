// Aggregation Store
// In-memory gauges and counters behind one lock, with snapshot persistence

pub mod file;

pub use file::{FileStorage, Snapshot};

use crate::error::{MetricsError, PersistenceError, Result};
use crate::metrics::{Metric, MetricKind, MetricValue};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Both mappings live under the same lock so a snapshot never sees one
/// mapping ahead of the other
#[derive(Debug, Default)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

/// Shared aggregation store
///
/// Constructed once by the server and handed to every handler through an
/// `Arc`. Gauges are last-write-wins, counters accumulate every delta.
#[derive(Debug, Default)]
pub struct MetricStore {
    maps: RwLock<Maps>,

    /// Snapshot file, if persistence is enabled
    file: Option<FileStorage>,

    /// Wakes the persister after a write
    changed: Notify,
}

impl MetricStore {
    /// Create a memory-only store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store backed by a snapshot file
    pub fn with_file(file: FileStorage) -> Self {
        Self {
            file: Some(file),
            ..Self::default()
        }
    }

    pub fn file(&self) -> Option<&FileStorage> {
        self.file.as_ref()
    }

    /// Overwrite a gauge and return the stored value
    pub fn set_gauge(&self, name: &str, value: f64) -> f64 {
        self.maps.write().gauges.insert(name.to_string(), value);
        self.changed.notify_one();
        value
    }

    /// Add a delta to a counter, creating it at zero, and return the new total
    ///
    /// Negative deltas are accepted. The total saturates at the i64 bounds.
    pub fn add_counter(&self, name: &str, delta: i64) -> i64 {
        let total = {
            let mut maps = self.maps.write();
            let entry = maps.counters.entry(name.to_string()).or_insert(0);
            *entry = entry.saturating_add(delta);
            *entry
        };
        self.changed.notify_one();
        total
    }

    pub fn get_gauge(&self, name: &str) -> Result<f64> {
        self.maps
            .read()
            .gauges
            .get(name)
            .copied()
            .ok_or_else(|| MetricsError::not_found(MetricKind::Gauge, name))
    }

    pub fn get_counter(&self, name: &str) -> Result<i64> {
        self.maps
            .read()
            .counters
            .get(name)
            .copied()
            .ok_or_else(|| MetricsError::not_found(MetricKind::Counter, name))
    }

    /// Look up the current value of a metric by kind
    pub fn get(&self, kind: MetricKind, name: &str) -> Result<Metric> {
        let value = match kind {
            MetricKind::Gauge => MetricValue::Gauge(self.get_gauge(name)?),
            MetricKind::Counter => MetricValue::Counter(self.get_counter(name)?),
        };
        Ok(Metric {
            name: name.to_string(),
            value,
        })
    }

    /// Apply an update and return the metric as stored
    ///
    /// For counters the returned value is the cumulative total, not the delta.
    pub fn apply(&self, update: &Metric) -> Metric {
        let value = match update.value {
            MetricValue::Gauge(v) => MetricValue::Gauge(self.set_gauge(&update.name, v)),
            MetricValue::Counter(d) => MetricValue::Counter(self.add_counter(&update.name, d)),
        };
        Metric {
            name: update.name.clone(),
            value,
        }
    }

    /// Copy both mappings under one read lock
    pub fn snapshot_all(&self) -> Snapshot {
        let maps = self.maps.read();
        Snapshot {
            gauges: maps.gauges.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            counters: maps.counters.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }

    /// Replace the contents of the store with a snapshot
    pub fn restore(&self, snapshot: Snapshot) {
        let mut maps = self.maps.write();
        maps.gauges = snapshot.gauges.into_iter().collect();
        maps.counters = snapshot.counters.into_iter().collect();
    }

    /// Persist the current contents; a no-op without a snapshot file
    pub fn save_to_file(&self) -> Result<(), PersistenceError> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let snapshot = self.snapshot_all();
        file.save(&snapshot)?;
        debug!(metrics = snapshot.len(), "Store saved");
        Ok(())
    }

    /// Seed the store from its snapshot file
    ///
    /// The file is fully parsed before the store is touched, so a corrupt
    /// snapshot leaves the current contents untouched.
    pub fn load_from_file(&self) -> Result<(), PersistenceError> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let snapshot = file.load()?;
        info!(
            path = %file.path().display(),
            gauges = snapshot.gauges.len(),
            counters = snapshot.counters.len(),
            "Store restored from snapshot"
        );
        self.restore(snapshot);
        Ok(())
    }

    /// Resolves after the next write to the store
    ///
    /// Writes that happen while nobody waits are coalesced into one wakeup.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_counter_accumulates() {
        let store = MetricStore::new();
        let deltas = [5, 3, -2, 10, 0];

        let mut last = 0;
        for delta in deltas {
            last = store.add_counter("Hits", delta);
        }

        assert_eq!(last, deltas.iter().sum::<i64>());
        assert_eq!(store.get_counter("Hits").unwrap(), 16);
    }

    #[test]
    fn test_gauge_last_write_wins() {
        let store = MetricStore::new();
        store.set_gauge("Temp", 36.6);
        assert_eq!(store.set_gauge("Temp", 37.5), 37.5);
        assert_eq!(store.get_gauge("Temp").unwrap(), 37.5);
    }

    #[test]
    fn test_kinds_do_not_collide() {
        let store = MetricStore::new();
        store.set_gauge("Shared", 1.5);
        store.add_counter("Shared", 4);

        assert_eq!(store.get_gauge("Shared").unwrap(), 1.5);
        assert_eq!(store.get_counter("Shared").unwrap(), 4);
    }

    #[test]
    fn test_missing_metric() {
        let store = MetricStore::new();
        assert!(matches!(store.get_gauge("Unknown"), Err(MetricsError::NotFound { .. })));
        assert!(matches!(
            store.get(MetricKind::Counter, "Unknown"),
            Err(MetricsError::NotFound { .. })
        ));
    }

    #[test]
    fn test_apply_echoes_total() {
        let store = MetricStore::new();
        store.apply(&Metric::counter("PollCount", 7));
        let echoed = store.apply(&Metric::counter("PollCount", 3));
        assert_eq!(echoed, Metric::counter("PollCount", 10));
    }

    #[test]
    fn test_counter_saturates() {
        let store = MetricStore::new();
        store.add_counter("Big", i64::MAX);
        assert_eq!(store.add_counter("Big", 1), i64::MAX);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = MetricStore::new();
        store.set_gauge("Alloc", 1.0);
        let snapshot = store.snapshot_all();

        store.set_gauge("Alloc", 2.0);
        assert_eq!(snapshot.gauges.get("Alloc"), Some(&1.0));
    }

    #[test]
    fn test_concurrent_increments() {
        let store = Arc::new(MetricStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        store.add_counter("Hits", 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_counter("Hits").unwrap(), 8000);
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("metrics.json");

        let store = MetricStore::with_file(FileStorage::new(&path));
        store.set_gauge("Alloc", 512.25);
        store.add_counter("PollCount", 9);
        store.save_to_file().unwrap();

        let restored = MetricStore::with_file(FileStorage::new(&path));
        restored.load_from_file().unwrap();
        assert_eq!(restored.snapshot_all(), store.snapshot_all());
    }

    #[test]
    fn test_corrupt_load_keeps_contents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("metrics.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = MetricStore::with_file(FileStorage::new(&path));
        store.set_gauge("Alloc", 3.0);
        store.add_counter("Hits", 2);
        let before = store.snapshot_all();

        assert!(store.load_from_file().is_err());
        assert_eq!(store.snapshot_all(), before);
    }

    #[test]
    fn test_memory_only_store_skips_io() {
        let store = MetricStore::new();
        store.set_gauge("Alloc", 1.0);
        assert!(store.save_to_file().is_ok());
        assert!(store.load_from_file().is_ok());
        assert_eq!(store.get_gauge("Alloc").unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_write_wakes_waiter() {
        let store = Arc::new(MetricStore::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.changed().await })
        };

        store.set_gauge("Alloc", 1.0);
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }
}
