use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dd_common::types::Snapshot;
use tokio::sync::RwLock;

/// Holds the published snapshot. Snapshots are immutable once published;
/// a cycle replaces the `Arc` wholesale so readers never see a partial one.
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
    cycles: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::empty())),
            cycles: AtomicU64::new(0),
        }
    }

    pub async fn current(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    /// Swap in a new snapshot and return the cycle sequence number.
    pub async fn publish(&self, snapshot: Snapshot) -> u64 {
        let snapshot = Arc::new(snapshot);
        *self.current.write().await = snapshot;
        self.cycles.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Completed cycles, successful or not.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
