//! Change chunking and flush scheduling.
//!
//! This module provides:
//! - The chunk data model and content hashing/diffing
//! - A time-bounded chunking strategy
//! - A lifecycle manager with adaptive active/idle flushing
//! - Store and emitter boundaries for finalized chunks

mod diff;
mod emitter;
mod manager;
mod model;
mod store;
mod strategy;

pub use diff::{hash_content, render_diff};
pub use emitter::{ChannelEmitter, ChunkEvent, EventEmitter, LoggingEmitter, NoopEmitter};
pub use manager::{ChunkManager, FlushMode, LifecycleConfig};
pub use model::{ActiveChunk, ChangeEvent, Chunk, ChunkId};
pub use store::ChunkStore;
pub use strategy::{ChunkStrategy, UnifiedStrategy, DEFAULT_FLUSH_TIMEOUT};
