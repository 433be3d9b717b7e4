//! File system watching.
//!
//! This module provides:
//! - Per-directory watching using notify-rs
//! - Gitignore-style path filtering with pruned subtrees
//! - The `ChangeHandler` boundary that receives changed file contents

mod filter;
mod handler;
#[allow(clippy::module_inception)]
mod watcher;

pub use filter::{is_trackable_file, IgnoreRules, DEFAULT_RULES, IGNORE_FILE};
pub use handler::{ChangeHandler, WatcherStats, WatcherStatsSnapshot};
pub use watcher::FileWatcher;
