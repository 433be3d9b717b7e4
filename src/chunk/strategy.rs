//! Chunking strategies.
//!
//! A strategy consumes change events and decides when an in-progress chunk is
//! finalized. [`UnifiedStrategy`] keeps one active chunk per path and closes it
//! once the path has been quiet for the flush timeout.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::diff::hash_content;
use super::model::{ActiveChunk, ChangeEvent, Chunk, ChunkId};

/// Default quiet period after which an active chunk is flushed.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Groups file changes into chunks.
pub trait ChunkStrategy: Send + Sync {
    /// Record a change, opening or extending the chunk for its path.
    fn on_change(&self, event: ChangeEvent);

    /// Flush every chunk that has not been updated for the flush timeout.
    fn flush_stale(&self, now: DateTime<Utc>) -> Vec<Chunk>;

    /// Flush every active chunk regardless of age.
    fn flush_all(&self) -> Vec<Chunk>;

    /// Flush the chunk for one path, marking it manual.
    ///
    /// Returns `None` if the path has no active chunk.
    fn force_flush(&self, path: &str) -> Option<Chunk>;

    /// Number of paths with an active chunk.
    fn active_count(&self) -> usize;
}

/// Active chunks plus the bookkeeping needed to keep ids unique.
#[derive(Debug, Default)]
struct ChunkTable {
    active: HashMap<String, ActiveChunk>,
    /// Last chunk start per path, as (unix second, sequence within that second).
    id_seq: HashMap<String, (i64, u32)>,
}

impl ChunkTable {
    fn next_id(&mut self, path: &str, start: DateTime<Utc>) -> ChunkId {
        let second = start.timestamp();
        let seq = match self.id_seq.get(path) {
            Some(&(last, n)) if last == second => n + 1,
            _ => 0,
        };
        self.id_seq.insert(path.to_string(), (second, seq));
        ChunkId::new(path, start, seq)
    }

    fn drain_where(
        &mut self,
        mut pred: impl FnMut(&ActiveChunk) -> bool,
        manual: bool,
    ) -> Vec<Chunk> {
        let paths: Vec<String> = self
            .active
            .iter()
            .filter(|(_, chunk)| pred(chunk))
            .map(|(path, _)| path.clone())
            .collect();

        let mut flushed: Vec<Chunk> = paths
            .into_iter()
            .filter_map(|path| self.active.remove(&path))
            .map(|active| active.finish(manual))
            .collect();

        flushed.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        flushed
    }
}

/// Time-bounded chunking: one active chunk per path, flushed after a quiet period.
///
/// Every operation holds a single lock over the table for its whole duration.
/// The work done under it is in-memory only.
#[derive(Debug)]
pub struct UnifiedStrategy {
    table: Mutex<ChunkTable>,
    flush_timeout: Duration,
}

impl UnifiedStrategy {
    /// Create a strategy with the given flush timeout.
    #[must_use]
    pub fn new(flush_timeout: Duration) -> Self {
        Self {
            table: Mutex::new(ChunkTable::default()),
            flush_timeout,
        }
    }

    /// Create a strategy with the default 15 minute flush timeout.
    #[must_use]
    pub fn with_default_timeout() -> Self {
        Self::new(DEFAULT_FLUSH_TIMEOUT)
    }

    /// Configured flush timeout.
    #[must_use]
    pub const fn flush_timeout(&self) -> Duration {
        self.flush_timeout
    }

    /// Snapshot of the active chunk for a path.
    #[must_use]
    pub fn active_chunk(&self, path: &str) -> Option<ActiveChunk> {
        self.table.lock().active.get(path).cloned()
    }
}

impl Default for UnifiedStrategy {
    fn default() -> Self {
        Self::with_default_timeout()
    }
}

impl ChunkStrategy for UnifiedStrategy {
    fn on_change(&self, event: ChangeEvent) {
        let hash = hash_content(&event.contents);
        let mut table = self.table.lock();

        if let Some(active) = table.active.get_mut(&event.path) {
            if active.initial_hash == hash {
                tracing::debug!(path = %event.path, "Content matches chunk start, ignoring");
                return;
            }
            active.update(event.contents, hash, event.time);
            tracing::debug!(path = %event.path, id = %active.id, "Updated chunk");
            return;
        }

        let id = table.next_id(&event.path, event.time);
        tracing::debug!(path = %event.path, %id, "Started tracking changes");
        let path = event.path.clone();
        table.active.insert(path, ActiveChunk::start(id, event, hash));
    }

    fn flush_stale(&self, now: DateTime<Utc>) -> Vec<Chunk> {
        let timeout = self.flush_timeout;
        let flushed = self.table.lock().drain_where(
            |chunk| {
                (now - chunk.last_update())
                    .to_std()
                    .is_ok_and(|idle| idle >= timeout)
            },
            false,
        );

        if !flushed.is_empty() {
            tracing::debug!(count = flushed.len(), "Flushed stale chunks");
        }
        flushed
    }

    fn flush_all(&self) -> Vec<Chunk> {
        self.table.lock().drain_where(|_| true, false)
    }

    fn force_flush(&self, path: &str) -> Option<Chunk> {
        let chunk = self.table.lock().active.remove(path)?.finish(true);
        tracing::debug!(path, id = %chunk.id, "Force flushed chunk");
        Some(chunk)
    }

    fn active_count(&self) -> usize {
        self.table.lock().active.len()
    }
}
