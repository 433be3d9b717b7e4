//! Chunk lifecycle management.
//!
//! The manager owns a strategy, a store and an emitter, and runs a timer whose
//! period adapts to activity: short while edits arrive, long once the tree has
//! gone quiet. Entering the idle cadence flushes everything that is pending.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::emitter::EventEmitter;
use super::model::{ChangeEvent, Chunk};
use super::store::ChunkStore;
use super::strategy::ChunkStrategy;
use crate::error::StorageError;
use crate::watcher::ChangeHandler;
use crate::Result;

/// Timer cadence configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Timer period while active.
    pub active_interval: Duration,
    /// Timer period while idle.
    pub idle_interval: Duration,
    /// Quiet time after which the manager goes idle.
    pub idle_threshold: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            active_interval: Duration::from_secs(5 * 60),
            idle_interval: Duration::from_secs(30 * 60),
            idle_threshold: Duration::from_secs(5 * 60),
        }
    }
}

/// Flush cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Edits are arriving; ticks flush stale chunks only.
    Active,
    /// Nothing has changed for the idle threshold; ticks are infrequent.
    Idle,
}

/// Work performed by one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickAction {
    FlushStale,
    FlushAll,
}

impl FlushMode {
    /// Timer period for this mode.
    #[must_use]
    pub const fn period(self, config: &LifecycleConfig) -> Duration {
        match self {
            Self::Active => config.active_interval,
            Self::Idle => config.idle_interval,
        }
    }

    /// Any change returns the manager to the active cadence.
    const fn on_activity(self) -> Self {
        Self::Active
    }

    /// Decide the next mode and the flush to perform on a tick.
    fn on_tick(self, quiet_for: Duration, idle_threshold: Duration) -> (Self, TickAction) {
        match self {
            Self::Active if quiet_for >= idle_threshold => (Self::Idle, TickAction::FlushAll),
            mode => (mode, TickAction::FlushStale),
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    mode: FlushMode,
    last_activity: DateTime<Utc>,
}

struct TimerTask {
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

struct Shared {
    strategy: Box<dyn ChunkStrategy>,
    store: Arc<dyn ChunkStore>,
    emitter: Arc<dyn EventEmitter>,
    config: LifecycleConfig,
    /// Manager lock: serializes changes, flushes and ticks.
    state: Mutex<Lifecycle>,
    /// Wakes the timer so it re-reads the period after Idle -> Active.
    rearm: Notify,
    timer: Mutex<Option<TimerTask>>,
}

/// Drives chunk flushing and forwards finalized chunks to the store and emitter.
///
/// Clones share the same state. `stop` only halts the timer; chunks still in
/// memory are lost unless `flush_all` is called first.
#[derive(Clone)]
pub struct ChunkManager {
    shared: Arc<Shared>,
}

impl ChunkManager {
    /// Create a manager. The timer is not started.
    pub fn new(
        strategy: impl ChunkStrategy + 'static,
        store: Arc<dyn ChunkStore>,
        emitter: Arc<dyn EventEmitter>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                strategy: Box::new(strategy),
                store,
                emitter,
                config,
                state: Mutex::new(Lifecycle {
                    mode: FlushMode::Active,
                    last_activity: Utc::now(),
                }),
                rearm: Notify::new(),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Start the flush timer. Calling it while running has no effect.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self) {
        let mut timer = self.shared.timer.lock();
        if timer.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_timer(Arc::clone(&self.shared), cancel.clone()));
        *timer = Some(TimerTask {
            cancel,
            _handle: handle,
        });
        tracing::info!(
            period = ?self.current_period(),
            "Chunk manager started"
        );
    }

    /// Stop the flush timer without waiting for an in-flight tick.
    pub fn stop(&self) {
        if let Some(task) = self.shared.timer.lock().take() {
            task.cancel.cancel();
            tracing::info!("Chunk manager stopped");
        }
    }

    /// Whether the timer task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.timer.lock().is_some()
    }

    /// Record a change observed now.
    pub fn on_file_change(&self, path: impl Into<String>, contents: Vec<u8>) {
        self.on_file_change_at(path, contents, Utc::now());
    }

    /// Record a change observed at `now`.
    pub fn on_file_change_at(&self, path: impl Into<String>, contents: Vec<u8>, now: DateTime<Utc>) {
        let resumed = {
            let mut state = self.shared.state.lock();
            state.last_activity = now;
            let previous = state.mode;
            state.mode = previous.on_activity();
            self.shared
                .strategy
                .on_change(ChangeEvent::new(path, contents, now));
            previous != state.mode
        };

        if resumed {
            tracing::info!("Activity resumed, switching to active flush cadence");
            self.shared.rearm.notify_one();
        }
    }

    /// Flush and save the chunk for one path.
    ///
    /// A path with no active chunk is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the store error if the chunk cannot be saved; the chunk is dropped.
    pub fn force_flush(&self, path: &str) -> Result<()> {
        let _state = self.shared.state.lock();

        let Some(chunk) = self.shared.strategy.force_flush(path) else {
            tracing::debug!(path, "No active chunk to flush");
            return Ok(());
        };

        if let Err(e) = self.shared.store.save_chunk(&chunk) {
            tracing::error!(id = %chunk.id, path, error = %e, "Failed to save chunk");
            return Err(e);
        }

        tracing::info!(id = %chunk.id, path, "Manually flushed chunk");
        self.shared.notify(|emitter| emitter.chunk_created(&chunk));
        Ok(())
    }

    /// Flush and save every active chunk.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::FlushIncomplete`] if any chunk failed to save.
    /// Every chunk is attempted regardless.
    pub fn flush_all(&self) -> Result<()> {
        let _state = self.shared.state.lock();
        let chunks = self.shared.strategy.flush_all();
        let total = chunks.len();
        let failed = self.shared.persist_batch(chunks);

        if failed > 0 {
            return Err(StorageError::FlushIncomplete { failed, total }.into());
        }
        Ok(())
    }

    /// Run one timer evaluation now.
    pub fn tick(&self) {
        self.shared.tick_at(Utc::now());
    }

    /// Run one timer evaluation as of `now`.
    pub fn tick_at(&self, now: DateTime<Utc>) {
        self.shared.tick_at(now);
    }

    /// Current flush cadence.
    #[must_use]
    pub fn mode(&self) -> FlushMode {
        self.shared.state.lock().mode
    }

    /// Timer period for the current mode.
    #[must_use]
    pub fn current_period(&self) -> Duration {
        self.shared.current_period()
    }

    /// Number of paths with unflushed changes.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.shared.strategy.active_count()
    }
}

impl Shared {
    fn current_period(&self) -> Duration {
        self.state.lock().mode.period(&self.config)
    }

    fn tick_at(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        let quiet_for = (now - state.last_activity).to_std().unwrap_or_default();
        let (next, action) = state.mode.on_tick(quiet_for, self.config.idle_threshold);

        let chunks = match action {
            TickAction::FlushStale => self.strategy.flush_stale(now),
            TickAction::FlushAll => self.strategy.flush_all(),
        };

        if next != state.mode {
            tracing::info!(
                quiet_secs = quiet_for.as_secs(),
                flushed = chunks.len(),
                "No recent activity, switching to idle flush cadence"
            );
            state.mode = next;
        }

        self.persist_batch(chunks);
    }

    /// Save each chunk independently; returns how many failed.
    fn persist_batch(&self, chunks: Vec<Chunk>) -> usize {
        if chunks.is_empty() {
            return 0;
        }

        let total = chunks.len();
        let saved: Vec<Chunk> = chunks
            .into_iter()
            .filter(|chunk| match self.store.save_chunk(chunk) {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(
                        id = %chunk.id,
                        path = %chunk.file_path,
                        error = %e,
                        "Failed to save chunk, dropping it"
                    );
                    false
                }
            })
            .collect();

        if !saved.is_empty() {
            tracing::info!(count = saved.len(), "Flushed chunks");
            self.notify(|emitter| emitter.chunks_flushed(&saved));
        }
        total - saved.len()
    }

    fn notify(&self, f: impl FnOnce(&dyn EventEmitter)) {
        let emitter = &*self.emitter;
        if catch_unwind(AssertUnwindSafe(|| f(emitter))).is_err() {
            tracing::warn!("Chunk emitter panicked, notification dropped");
        }
    }
}

async fn run_timer(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        let period = shared.current_period();
        tokio::select! {
            () = cancel.cancelled() => break,
            () = shared.rearm.notified() => {}
            () = tokio::time::sleep(period) => shared.tick_at(Utc::now()),
        }
    }
    tracing::debug!("Flush timer exited");
}

impl ChangeHandler for ChunkManager {
    fn on_file_change(&self, path: &Path, contents: Vec<u8>) {
        self.on_file_change_at(path.to_string_lossy(), contents, Utc::now());
    }
}

impl std::fmt::Debug for ChunkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkManager")
            .field("config", &self.shared.config)
            .field("mode", &self.mode())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChannelEmitter, ChunkEvent, NoopEmitter, UnifiedStrategy};
    use crate::storage::MemoryChunkStore;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    const MIN: i64 = 60;

    fn manager_with(
        store: Arc<dyn ChunkStore>,
        emitter: Arc<dyn EventEmitter>,
    ) -> ChunkManager {
        ChunkManager::new(
            UnifiedStrategy::with_default_timeout(),
            store,
            emitter,
            LifecycleConfig::default(),
        )
    }

    /// Store that rejects chunks for one path.
    struct RejectingStore {
        inner: MemoryChunkStore,
        reject: &'static str,
    }

    impl ChunkStore for RejectingStore {
        fn save_chunk(&self, chunk: &Chunk) -> Result<()> {
            if chunk.file_path == self.reject {
                return Err(StorageError::Database("disk full".into()).into());
            }
            self.inner.save_chunk(chunk)
        }

        fn find_chunks(&self, file_path: &str) -> Result<Vec<Chunk>> {
            self.inner.find_chunks(file_path)
        }

        fn recent_chunks(&self, limit: usize) -> Result<Vec<Chunk>> {
            self.inner.recent_chunks(limit)
        }
    }

    struct PanickingEmitter;

    impl EventEmitter for PanickingEmitter {
        fn chunk_created(&self, _chunk: &Chunk) {
            panic!("emitter failure");
        }

        fn chunks_flushed(&self, _chunks: &[Chunk]) {
            panic!("emitter failure");
        }
    }

    #[test]
    fn test_flush_mode_transitions() {
        let threshold = Duration::from_secs(300);
        assert_eq!(
            FlushMode::Active.on_tick(Duration::from_secs(10), threshold),
            (FlushMode::Active, TickAction::FlushStale)
        );
        assert_eq!(
            FlushMode::Active.on_tick(threshold, threshold),
            (FlushMode::Idle, TickAction::FlushAll)
        );
        assert_eq!(
            FlushMode::Idle.on_tick(Duration::from_secs(9999), threshold),
            (FlushMode::Idle, TickAction::FlushStale)
        );
        assert_eq!(FlushMode::Idle.on_activity(), FlushMode::Active);
    }

    #[test]
    fn test_force_flush_saves_manual_chunk_and_emits_created() {
        let store = Arc::new(MemoryChunkStore::new());
        let (emitter, mut rx) = ChannelEmitter::new();
        let manager = manager_with(store.clone(), Arc::new(emitter));

        manager.on_file_change_at("a.txt", b"v1".to_vec(), at(0));
        manager.on_file_change_at("a.txt", b"v2".to_vec(), at(1));
        manager.force_flush("a.txt").unwrap();

        let saved = store.find_chunks("a.txt").unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].manual);
        assert_eq!(saved[0].start_time, at(0));
        assert_eq!(saved[0].end_time, at(1));
        assert!(saved[0].diff.contains("-v1\n+v2"));

        assert!(matches!(rx.try_recv().unwrap(), ChunkEvent::Created(_)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_force_flush_without_chunk_is_noop() {
        let store = Arc::new(MemoryChunkStore::new());
        let manager = manager_with(store.clone(), Arc::new(NoopEmitter));

        manager.force_flush("missing.txt").unwrap();
        assert!(store.recent_chunks(10).unwrap().is_empty());
    }

    #[test]
    fn test_force_flush_propagates_store_error() {
        let store = Arc::new(RejectingStore {
            inner: MemoryChunkStore::new(),
            reject: "bad.txt",
        });
        let manager = manager_with(store, Arc::new(NoopEmitter));

        manager.on_file_change_at("bad.txt", b"x".to_vec(), at(0));
        assert!(manager.force_flush("bad.txt").is_err());
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_flush_all_continues_past_failed_save() {
        let store = Arc::new(RejectingStore {
            inner: MemoryChunkStore::new(),
            reject: "bad.txt",
        });
        let (emitter, mut rx) = ChannelEmitter::new();
        let manager = manager_with(store.clone(), Arc::new(emitter));

        manager.on_file_change_at("bad.txt", b"x".to_vec(), at(0));
        manager.on_file_change_at("good.txt", b"y".to_vec(), at(1));

        let err = manager.flush_all().unwrap_err();
        assert!(err.to_string().contains("1 of 2"));
        assert_eq!(manager.active_count(), 0);
        assert_eq!(store.find_chunks("good.txt").unwrap().len(), 1);

        match rx.try_recv().unwrap() {
            ChunkEvent::Flushed(chunks) => {
                assert_eq!(chunks.len(), 1);
                assert_eq!(chunks[0].file_path, "good.txt");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_flush_all_two_paths() {
        let store = Arc::new(MemoryChunkStore::new());
        let manager = manager_with(store.clone(), Arc::new(NoopEmitter));

        manager.on_file_change_at("a.txt", b"a".to_vec(), at(0));
        manager.on_file_change_at("b.txt", b"b".to_vec(), at(0));
        manager.flush_all().unwrap();

        assert_eq!(store.recent_chunks(10).unwrap().len(), 2);
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.mode(), FlushMode::Active);
    }

    #[test]
    fn test_active_tick_flushes_only_stale_chunks() {
        let store = Arc::new(MemoryChunkStore::new());
        let manager = manager_with(store.clone(), Arc::new(NoopEmitter));

        manager.on_file_change_at("old.txt", b"o".to_vec(), at(0));
        manager.on_file_change_at("new.txt", b"n".to_vec(), at(14 * MIN));

        manager.tick_at(at(15 * MIN));

        let saved = store.recent_chunks(10).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].file_path, "old.txt");
        assert_eq!(manager.mode(), FlushMode::Active);
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn test_quiet_tree_goes_idle_and_flushes_everything() {
        let store = Arc::new(MemoryChunkStore::new());
        let manager = manager_with(store.clone(), Arc::new(NoopEmitter));

        manager.on_file_change_at("a.txt", b"a".to_vec(), at(0));
        assert_eq!(manager.current_period(), Duration::from_secs(5 * 60));

        manager.tick_at(at(5 * MIN));

        assert_eq!(store.recent_chunks(10).unwrap().len(), 1);
        assert_eq!(manager.mode(), FlushMode::Idle);
        assert_eq!(manager.current_period(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_change_while_idle_returns_to_active() {
        let store = Arc::new(MemoryChunkStore::new());
        let manager = manager_with(store.clone(), Arc::new(NoopEmitter));

        manager.on_file_change_at("a.txt", b"a".to_vec(), at(0));
        manager.tick_at(at(5 * MIN));
        assert_eq!(manager.mode(), FlushMode::Idle);

        manager.on_file_change_at("a.txt", b"b".to_vec(), at(10 * MIN));
        assert_eq!(manager.mode(), FlushMode::Active);
        assert_eq!(manager.current_period(), Duration::from_secs(5 * 60));

        // Next tick is a stale-only flush; the fresh chunk survives.
        manager.tick_at(at(11 * MIN));
        assert_eq!(manager.mode(), FlushMode::Active);
        assert_eq!(manager.active_count(), 1);
        assert_eq!(store.recent_chunks(10).unwrap().len(), 1);
    }

    #[test]
    fn test_explicit_flushes_do_not_change_mode() {
        let store = Arc::new(MemoryChunkStore::new());
        let manager = manager_with(store, Arc::new(NoopEmitter));

        manager.tick_at(Utc::now() + chrono::Duration::minutes(10));
        assert_eq!(manager.mode(), FlushMode::Idle);

        manager.flush_all().unwrap();
        manager.force_flush("a.txt").unwrap();
        assert_eq!(manager.mode(), FlushMode::Idle);
    }

    #[test]
    fn test_panicking_emitter_does_not_abort_flush() {
        let store = Arc::new(MemoryChunkStore::new());
        let manager = manager_with(store.clone(), Arc::new(PanickingEmitter));

        manager.on_file_change_at("a.txt", b"a".to_vec(), at(0));
        manager.on_file_change_at("b.txt", b"b".to_vec(), at(0));
        manager.force_flush("a.txt").unwrap();
        manager.flush_all().unwrap();

        assert_eq!(store.recent_chunks(10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_timer_flushes_stale_chunks() {
        let store = Arc::new(MemoryChunkStore::new());
        let manager = ChunkManager::new(
            UnifiedStrategy::new(Duration::from_millis(1)),
            store.clone(),
            Arc::new(NoopEmitter),
            LifecycleConfig {
                active_interval: Duration::from_millis(10),
                idle_interval: Duration::from_secs(3600),
                idle_threshold: Duration::from_secs(3600),
            },
        );

        manager.on_file_change("a.txt", b"a".to_vec());
        manager.start();
        assert!(manager.is_running());

        tokio::time::sleep(Duration::from_millis(200)).await;
        manager.stop();

        assert!(!manager.is_running());
        assert_eq!(store.find_chunks("a.txt").unwrap().len(), 1);
        assert_eq!(manager.mode(), FlushMode::Active);
    }

    #[tokio::test]
    async fn test_timer_enters_idle_and_stop_keeps_pending_chunks() {
        let store = Arc::new(MemoryChunkStore::new());
        let manager = ChunkManager::new(
            UnifiedStrategy::with_default_timeout(),
            store.clone(),
            Arc::new(NoopEmitter),
            LifecycleConfig {
                active_interval: Duration::from_millis(10),
                idle_interval: Duration::from_secs(3600),
                idle_threshold: Duration::from_millis(20),
            },
        );

        manager.on_file_change("a.txt", b"a".to_vec());
        manager.start();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(manager.mode(), FlushMode::Idle);
        assert_eq!(store.find_chunks("a.txt").unwrap().len(), 1);

        manager.stop();
        manager.on_file_change("b.txt", b"b".to_vec());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(manager.active_count(), 1);
        assert!(store.find_chunks("b.txt").unwrap().is_empty());
    }
}
