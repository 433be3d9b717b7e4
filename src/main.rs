//! Carya - edit history for a source tree
//!
//! Entry point for the `carya` binary.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use carya::chunk::{Chunk, ChunkManager, ChunkStore, LoggingEmitter, UnifiedStrategy};
use carya::observability::init_tracing;
use carya::storage::{init_storage, Database, SqliteChunkStore};
use carya::watcher::FileWatcher;
use carya::{Config, Error, Result};
use clap::{Parser, Subcommand};

/// Carya - records what changed in a source tree, one chunk of edits at a time
#[derive(Parser, Debug)]
#[command(name = "carya")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root of the tree to observe
    #[arg(short, long, env = "CARYA_ROOT", default_value = ".", global = true)]
    root: PathBuf,

    /// Data directory for the chunk database (default: <root>/.carya)
    #[arg(short, long, env = "CARYA_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CARYA_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "CARYA_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the tree and record chunks until interrupted
    Watch {
        /// Seconds an untouched chunk stays open
        #[arg(long, env = "CARYA_FLUSH_TIMEOUT", default_value = "900")]
        flush_timeout: u64,

        /// Flush timer period in seconds while edits are arriving
        #[arg(long, env = "CARYA_ACTIVE_INTERVAL", default_value = "300")]
        active_interval: u64,

        /// Flush timer period in seconds once the tree is quiet
        #[arg(long, env = "CARYA_IDLE_INTERVAL", default_value = "1800")]
        idle_interval: u64,

        /// Seconds without edits before switching to the idle period
        #[arg(long, env = "CARYA_IDLE_THRESHOLD", default_value = "300")]
        idle_threshold: u64,
    },

    /// Print recorded chunks
    Log {
        /// Only show chunks for this file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Maximum number of chunks to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Print chunks as JSON lines
        #[arg(long)]
        json: bool,

        /// Include the diff of each chunk
        #[arg(short, long)]
        patch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    let mut config = Config::for_root(&cli.root);
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    config.log_level = cli.log_level;
    config.log_json = cli.log_json;

    match cli.command {
        Command::Watch {
            flush_timeout,
            active_interval,
            idle_interval,
            idle_threshold,
        } => {
            config.flush_timeout = Duration::from_secs(flush_timeout);
            config.active_interval = Duration::from_secs(active_interval);
            config.idle_interval = Duration::from_secs(idle_interval);
            config.idle_threshold = Duration::from_secs(idle_threshold);
            config.validate()?;
            watch(&config).await
        }
        Command::Log {
            file,
            limit,
            json,
            patch,
        } => {
            config.validate()?;
            log(&config, file, limit, json, patch)
        }
    }
}

fn open_store(config: &Config) -> Result<SqliteChunkStore> {
    let db = Database::open(config.database_path())?;
    init_storage(&db)?;
    Ok(SqliteChunkStore::new(db))
}

async fn watch(config: &Config) -> Result<()> {
    tracing::info!(
        "Carya v{} watching {}",
        env!("CARGO_PKG_VERSION"),
        config.root_dir.display()
    );
    tracing::debug!(?config, "Configuration loaded");

    let store = Arc::new(open_store(config)?);
    let manager = ChunkManager::new(
        UnifiedStrategy::new(config.flush_timeout),
        store,
        Arc::new(LoggingEmitter),
        config.lifecycle(),
    );
    manager.start();

    let watcher = FileWatcher::new(Arc::new(manager.clone()));
    watcher.start(&config.root_dir)?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupted, flushing open chunks");

    watcher.stop();
    let flushed = manager.flush_all();
    manager.stop();

    let stats = watcher.stats().snapshot();
    tracing::info!(
        events = stats.events_seen,
        delivered = stats.changes_delivered,
        ignored = stats.paths_ignored,
        "Watcher stopped"
    );
    flushed
}

fn log(config: &Config, file: Option<PathBuf>, limit: usize, json: bool, patch: bool) -> Result<()> {
    let store = open_store(config)?;

    let chunks = match file {
        Some(file) => {
            // Chunks are recorded under canonical paths.
            let path = file.canonicalize().unwrap_or(file);
            let mut chunks = store.find_chunks(&path.to_string_lossy())?;
            chunks.truncate(limit);
            chunks
        }
        None => store.recent_chunks(limit)?,
    };

    for chunk in &chunks {
        if json {
            let line = serde_json::to_string(chunk)
                .map_err(|e| Error::internal(format!("failed to encode chunk: {e}")))?;
            println!("{line}");
        } else {
            print_chunk(chunk, patch);
        }
    }
    Ok(())
}

fn print_chunk(chunk: &Chunk, patch: bool) {
    let minutes = (chunk.end_time - chunk.start_time).num_minutes();
    println!(
        "{}  {}  ({} min{})",
        chunk.start_time.format("%Y-%m-%d %H:%M:%S"),
        chunk.file_path,
        minutes,
        if chunk.manual { ", manual" } else { "" }
    );
    if patch {
        println!("{}", chunk.diff);
    }
}
