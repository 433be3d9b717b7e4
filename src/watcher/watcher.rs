//! File system watcher using notify-rs.
//!
//! Directories are registered one by one (non-recursively) so ignored
//! subtrees are never watched at all. A dedicated thread consumes the raw
//! notification stream, reads changed files and hands them to the handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use walkdir::WalkDir;

use super::filter::{is_trackable_file, IgnoreRules};
use super::handler::{ChangeHandler, WatcherStats};
use crate::error::WatcherError;
use crate::Result;

type Notifier = Arc<Mutex<Option<RecommendedWatcher>>>;

/// A running watch session.
struct Session {
    root: PathBuf,
    notifier: Notifier,
    stop_tx: Sender<()>,
    _thread: thread::JoinHandle<()>,
}

/// Ignore-aware recursive file watcher.
pub struct FileWatcher {
    handler: Arc<dyn ChangeHandler>,
    stats: Arc<WatcherStats>,
    session: Mutex<Option<Session>>,
}

impl FileWatcher {
    /// Create a watcher that reports changes to `handler`.
    #[must_use]
    pub fn new(handler: Arc<dyn ChangeHandler>) -> Self {
        Self {
            handler,
            stats: WatcherStats::new(),
            session: Mutex::new(None),
        }
    }

    /// Start watching the tree under `root`.
    ///
    /// Loads ignore rules, registers every non-ignored directory and then
    /// spawns the event thread. Nothing is kept if any step fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is invalid, the OS watch handle cannot be
    /// created, the tree cannot be walked, or the watcher is already running.
    pub fn start(&self, root: impl AsRef<Path>) -> Result<()> {
        let mut session = self.session.lock();
        let root = root.as_ref();

        if session.is_some() {
            return Err(WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: "watcher already started".to_string(),
            }
            .into());
        }

        let root = root
            .canonicalize()
            .map_err(|_| WatcherError::InvalidRoot(root.display().to_string()))?;
        if !root.is_dir() {
            return Err(WatcherError::InvalidRoot(root.display().to_string()).into());
        }

        let rules = Arc::new(IgnoreRules::load(&root));

        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let mut notifier = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                // Receiver gone means the session is shutting down.
                let _ = event_tx.send(result);
            },
            notify::Config::default(),
        )
        .map_err(|e| WatcherError::WatchFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

        let registered = register_tree(&mut notifier, &root, &root, &rules)?;
        self.stats
            .directories_registered
            .fetch_add(registered, std::sync::atomic::Ordering::Relaxed);

        let notifier: Notifier = Arc::new(Mutex::new(Some(notifier)));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);

        let event_loop = EventLoop {
            root: root.clone(),
            rules,
            notifier: Arc::clone(&notifier),
            handler: Arc::clone(&self.handler),
            stats: Arc::clone(&self.stats),
        };
        let thread = thread::Builder::new()
            .name("carya-watcher".to_string())
            .spawn(move || event_loop.run(&event_rx, &stop_rx))?;

        tracing::info!(root = %root.display(), directories = registered, "Watching tree");

        *session = Some(Session {
            root,
            notifier,
            stop_tx,
            _thread: thread,
        });
        Ok(())
    }

    /// Stop watching and release the OS handle.
    ///
    /// Does not wait for an event that is already being processed.
    pub fn stop(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };

        let _ = session.stop_tx.try_send(());
        drop(session.notifier.lock().take());
        tracing::info!(root = %session.root.display(), "Stopped watching tree");
    }

    /// Whether a watch session is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Canonical root of the running session.
    #[must_use]
    pub fn root(&self) -> Option<PathBuf> {
        self.session.lock().as_ref().map(|s| s.root.clone())
    }

    /// Get current stats.
    #[must_use]
    pub fn stats(&self) -> Arc<WatcherStats> {
        Arc::clone(&self.stats)
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("root", &self.root())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

/// Register `start` and every non-ignored directory below it, pre-order.
///
/// Ignored directories are pruned: their subtrees are neither walked nor registered.
fn register_tree(
    notifier: &mut RecommendedWatcher,
    root: &Path,
    start: &Path,
    rules: &IgnoreRules,
) -> Result<u64> {
    let walker = WalkDir::new(start)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .path()
                    .strip_prefix(root)
                    .is_ok_and(|rel| rules.should_ignore(rel, true)))
        });

    let mut registered = 0;
    for entry in walker {
        let entry = entry.map_err(|e| WatcherError::WalkFailed {
            path: e
                .path()
                .unwrap_or(start)
                .display()
                .to_string(),
            reason: e.to_string(),
        })?;

        if !entry.file_type().is_dir() {
            continue;
        }

        notifier
            .watch(entry.path(), RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::WatchFailed {
                path: entry.path().display().to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(path = %entry.path().display(), "Watching directory");
        registered += 1;
    }

    Ok(registered)
}

/// Consumer side of a watch session.
struct EventLoop {
    root: PathBuf,
    rules: Arc<IgnoreRules>,
    notifier: Notifier,
    handler: Arc<dyn ChangeHandler>,
    stats: Arc<WatcherStats>,
}

impl EventLoop {
    fn run(self, events: &Receiver<notify::Result<Event>>, stop: &Receiver<()>) {
        tracing::debug!("Watcher event loop started");
        loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                recv(events) -> message => match message {
                    Ok(Ok(event)) => self.handle(&event),
                    Ok(Err(e)) => tracing::warn!(error = %e, "Watch error"),
                    Err(_) => break,
                },
            }
        }
        tracing::debug!("Watcher event loop exited");
    }

    fn handle(&self, event: &Event) {
        WatcherStats::record(&self.stats.events_seen);

        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                for path in &event.paths {
                    self.handle_write(path);
                }
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    self.handle_remove(path);
                }
            }
            _ => {}
        }
    }

    fn handle_write(&self, path: &Path) {
        // Paths that vanished (or were renamed away) before we got here are dropped.
        let Ok(metadata) = std::fs::metadata(path) else {
            tracing::trace!(path = %path.display(), "Changed path no longer exists");
            return;
        };
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return;
        };

        if metadata.is_dir() {
            if self.rules.should_ignore(relative, true) {
                WatcherStats::record(&self.stats.paths_ignored);
                return;
            }
            self.add_directory(path);
            return;
        }

        if self.rules.should_ignore(relative, false) || !is_trackable_file(path) {
            WatcherStats::record(&self.stats.paths_ignored);
            tracing::trace!(path = %path.display(), "Ignoring file");
            return;
        }

        match std::fs::read(path) {
            Ok(contents) => {
                WatcherStats::record(&self.stats.changes_delivered);
                self.handler.on_file_change(path, contents);
            }
            Err(e) => {
                WatcherStats::record(&self.stats.read_failures);
                tracing::debug!(path = %path.display(), error = %e, "Failed to read changed file");
            }
        }
    }

    fn add_directory(&self, path: &Path) {
        let mut guard = self.notifier.lock();
        let Some(notifier) = guard.as_mut() else {
            return;
        };

        match register_tree(notifier, &self.root, path, &self.rules) {
            Ok(count) => {
                self.stats
                    .directories_registered
                    .fetch_add(count, std::sync::atomic::Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to watch new directory");
            }
        }
    }

    fn handle_remove(&self, path: &Path) {
        let mut guard = self.notifier.lock();
        if let Some(notifier) = guard.as_mut() {
            // Files were never registered, so most of these fail harmlessly.
            if let Err(e) = notifier.unwatch(path) {
                tracing::debug!(path = %path.display(), error = %e, "Unwatch failed");
            }
        }
    }
}
