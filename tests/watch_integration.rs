//! Watcher feeding a chunk manager over a real directory tree.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use carya::chunk::{ChunkManager, ChunkStore, LifecycleConfig, NoopEmitter, UnifiedStrategy};
use carya::storage::MemoryChunkStore;
use carya::watcher::FileWatcher;
use tempfile::TempDir;

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    false
}

fn setup(root: &Path) -> (Arc<MemoryChunkStore>, ChunkManager, FileWatcher) {
    let store = Arc::new(MemoryChunkStore::new());
    let manager = ChunkManager::new(
        UnifiedStrategy::with_default_timeout(),
        store.clone(),
        Arc::new(NoopEmitter),
        LifecycleConfig::default(),
    );
    let watcher = FileWatcher::new(Arc::new(manager.clone()));
    watcher.start(root).unwrap();
    (store, manager, watcher)
}

#[test]
fn edits_become_chunks() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("src")).unwrap();
    let (store, manager, watcher) = setup(tmp.path());

    fs::write(tmp.path().join("src/main.rs"), "fn main() {}\n").unwrap();
    assert!(wait_until(|| manager.active_count() == 1));

    watcher.stop();
    manager.flush_all().unwrap();

    let chunks = store.recent_chunks(10).unwrap();
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].file_path.ends_with("main.rs"));
    assert!(Path::new(&chunks[0].file_path).is_absolute());
}

#[test]
fn ignored_subtrees_never_reach_the_manager() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("node_modules/pkg")).unwrap();
    fs::create_dir(tmp.path().join("src")).unwrap();
    let (_store, manager, watcher) = setup(tmp.path());

    fs::write(tmp.path().join("node_modules/pkg/index.js"), "module.exports = 1;\n").unwrap();
    fs::write(tmp.path().join("src/lib.rs"), "pub fn f() {}\n").unwrap();
    assert!(wait_until(|| manager.active_count() >= 1));

    // Give any stray event from node_modules time to arrive.
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(manager.active_count(), 1);

    watcher.stop();
}

#[test]
fn gitignore_rules_are_honored() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".gitignore"), "# build output\ntarget/\n*.log\n").unwrap();
    fs::create_dir(tmp.path().join("target")).unwrap();
    let (store, manager, watcher) = setup(tmp.path());

    fs::write(tmp.path().join("target/out.txt"), "artifact").unwrap();
    fs::write(tmp.path().join("run.log"), "log line").unwrap();
    fs::write(tmp.path().join("README.md"), "# readme\n").unwrap();
    assert!(wait_until(|| manager.active_count() >= 1));
    std::thread::sleep(Duration::from_millis(300));

    watcher.stop();
    manager.flush_all().unwrap();

    let chunks = store.all();
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].file_path.ends_with("README.md"));
    assert!(watcher.stats().snapshot().paths_ignored >= 1);
}
