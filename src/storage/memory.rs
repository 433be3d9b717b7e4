//! In-memory chunk store.

use parking_lot::Mutex;

use crate::chunk::{Chunk, ChunkStore};
use crate::Result;

/// Chunk store kept in process memory, in save order.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    chunks: Mutex<Vec<Chunk>>,
}

impl MemoryChunkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }

    /// Every stored chunk in save order.
    #[must_use]
    pub fn all(&self) -> Vec<Chunk> {
        self.chunks.lock().clone()
    }
}

impl ChunkStore for MemoryChunkStore {
    fn save_chunk(&self, chunk: &Chunk) -> Result<()> {
        let mut chunks = self.chunks.lock();
        match chunks.iter_mut().find(|c| c.id == chunk.id) {
            Some(existing) => *existing = chunk.clone(),
            None => chunks.push(chunk.clone()),
        }
        Ok(())
    }

    fn find_chunks(&self, file_path: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .chunks
            .lock()
            .iter()
            .rev()
            .filter(|c| c.file_path == file_path)
            .cloned()
            .collect())
    }

    fn recent_chunks(&self, limit: usize) -> Result<Vec<Chunk>> {
        Ok(self.chunks.lock().iter().rev().take(limit).cloned().collect())
    }
}
