//! Change handler boundary and watcher statistics.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receives the contents of files that changed under the watch root.
pub trait ChangeHandler: Send + Sync {
    /// Called with the full current contents of a changed, tracked file.
    fn on_file_change(&self, path: &Path, contents: Vec<u8>);
}

/// Statistics for file watching.
#[derive(Debug, Default)]
pub struct WatcherStats {
    pub events_seen: AtomicU64,
    pub changes_delivered: AtomicU64,
    pub paths_ignored: AtomicU64,
    pub read_failures: AtomicU64,
    pub directories_registered: AtomicU64,
}

impl WatcherStats {
    /// Create new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            events_seen: self.events_seen.load(Ordering::Relaxed),
            changes_delivered: self.changes_delivered.load(Ordering::Relaxed),
            paths_ignored: self.paths_ignored.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            directories_registered: self.directories_registered.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of watcher stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStatsSnapshot {
    pub events_seen: u64,
    pub changes_delivered: u64,
    pub paths_ignored: u64,
    pub read_failures: u64,
    pub directories_registered: u64,
}
