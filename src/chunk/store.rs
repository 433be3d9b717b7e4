//! Persistence boundary for finalized chunks.

use super::model::Chunk;
use crate::Result;

/// Durable home for chunks once they leave the strategy.
///
/// Implementations decide serialization. Calls are made while the manager
/// lock is held, so a slow store delays ingestion of new changes.
pub trait ChunkStore: Send + Sync {
    /// Insert or replace a chunk by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk cannot be persisted.
    fn save_chunk(&self, chunk: &Chunk) -> Result<()>;

    /// All chunks for a file, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn find_chunks(&self, file_path: &str) -> Result<Vec<Chunk>>;

    /// The `limit` most recent chunks across all files, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn recent_chunks(&self, limit: usize) -> Result<Vec<Chunk>>;
}
