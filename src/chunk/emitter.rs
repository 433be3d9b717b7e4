//! Chunk notifications.
//!
//! Emitters are fire-and-forget: they return nothing, and the manager shields
//! flushes from emitter panics.

use tokio::sync::mpsc;

use super::model::Chunk;

/// Receives notifications about finalized chunks.
pub trait EventEmitter: Send + Sync {
    /// A single chunk was flushed on demand and saved.
    fn chunk_created(&self, chunk: &Chunk);

    /// A batch of chunks was flushed by the timer or a flush-all and saved.
    fn chunks_flushed(&self, chunks: &[Chunk]);
}

/// Logs chunk notifications through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEmitter;

impl EventEmitter for LoggingEmitter {
    fn chunk_created(&self, chunk: &Chunk) {
        tracing::info!(id = %chunk.id, path = %chunk.file_path, "Chunk created");
    }

    fn chunks_flushed(&self, chunks: &[Chunk]) {
        tracing::info!(count = chunks.len(), "Flushed chunks");
    }
}

/// Discards all notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
    fn chunk_created(&self, _chunk: &Chunk) {}

    fn chunks_flushed(&self, _chunks: &[Chunk]) {}
}

/// Notification forwarded by [`ChannelEmitter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkEvent {
    /// A manually flushed chunk.
    Created(Chunk),
    /// A batch of flushed chunks.
    Flushed(Vec<Chunk>),
}

/// Forwards notifications over an unbounded channel, for hosts that render them.
///
/// A closed receiver is not an error; notifications are simply dropped.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<ChunkEvent>,
}

impl ChannelEmitter {
    /// Create an emitter and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChunkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventEmitter for ChannelEmitter {
    fn chunk_created(&self, chunk: &Chunk) {
        if self.tx.send(ChunkEvent::Created(chunk.clone())).is_err() {
            tracing::trace!("Chunk event receiver closed");
        }
    }

    fn chunks_flushed(&self, chunks: &[Chunk]) {
        if self.tx.send(ChunkEvent::Flushed(chunks.to_vec())).is_err() {
            tracing::trace!("Chunk event receiver closed");
        }
    }
}
