//! Chunk data model.
//!
//! - [`ChangeEvent`]: one observed write, consumed immediately
//! - [`ActiveChunk`]: in-progress accumulation of edits to one path
//! - [`Chunk`]: finalized, immutable record handed to a store

#![allow(clippy::missing_const_for_fn)]

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::diff::render_diff;

/// Unique identifier of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Build an id for a chunk of `path` started at `start`.
    ///
    /// `seq` disambiguates chunks started for the same path within the same second.
    #[must_use]
    pub fn new(path: &str, start: DateTime<Utc>, seq: u32) -> Self {
        if seq == 0 {
            Self(format!("{path}-{}", start.timestamp()))
        } else {
            Self(format!("{path}-{}-{seq}", start.timestamp()))
        }
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ChunkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single observed change to a file.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Path of the changed file.
    pub path: String,
    /// Full file contents at the time of the change.
    pub contents: Vec<u8>,
    /// When the change was observed.
    pub time: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create a change event.
    pub fn new(path: impl Into<String>, contents: impl Into<Vec<u8>>, time: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            time,
        }
    }
}

/// Finalized record of all edits to one file between two flushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier.
    pub id: ChunkId,
    /// Path of the file this chunk describes.
    pub file_path: String,
    /// Rendered diff from the first to the last observed content.
    pub diff: String,
    /// First change in the chunk.
    pub start_time: DateTime<Utc>,
    /// Last change in the chunk.
    pub end_time: DateTime<Utc>,
    /// Hash of the final content.
    pub hash: String,
    /// Whether the chunk was flushed on demand.
    pub manual: bool,
}

/// In-progress chunk for one path.
///
/// `last_update` is always the end time, so the staleness clock and the
/// recorded period can never disagree.
#[derive(Debug, Clone)]
pub struct ActiveChunk {
    pub(crate) id: ChunkId,
    pub(crate) file_path: String,
    pub(crate) start_time: DateTime<Utc>,
    pub(crate) end_time: DateTime<Utc>,
    pub(crate) initial_hash: String,
    pub(crate) current_hash: String,
    pub(crate) initial_content: Vec<u8>,
    pub(crate) latest_content: Vec<u8>,
}

impl ActiveChunk {
    /// Start tracking a path from its first observed content.
    pub(crate) fn start(id: ChunkId, event: ChangeEvent, hash: String) -> Self {
        Self {
            id,
            file_path: event.path,
            start_time: event.time,
            end_time: event.time,
            current_hash: hash.clone(),
            initial_hash: hash,
            initial_content: event.contents.clone(),
            latest_content: event.contents,
        }
    }

    /// Record a newer version of the file.
    pub(crate) fn update(&mut self, contents: Vec<u8>, hash: String, time: DateTime<Utc>) {
        self.end_time = time.max(self.start_time);
        self.current_hash = hash;
        self.latest_content = contents;
    }

    /// Convert into an immutable chunk, rendering the diff from the captured content.
    pub(crate) fn finish(self, manual: bool) -> Chunk {
        let diff = render_diff(
            &self.file_path,
            &self.initial_hash,
            &self.current_hash,
            &self.initial_content,
            &self.latest_content,
        );

        Chunk {
            id: self.id,
            file_path: self.file_path,
            diff,
            start_time: self.start_time,
            end_time: self.end_time,
            hash: self.current_hash,
            manual,
        }
    }

    /// Chunk id.
    #[must_use]
    pub fn id(&self) -> &ChunkId {
        &self.id
    }

    /// Tracked file path.
    #[must_use]
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Time of the first change.
    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Time of the latest distinct change.
    #[must_use]
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// Time of the last update; identical to [`Self::end_time`].
    #[must_use]
    pub fn last_update(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// Hash of the content that opened the chunk.
    #[must_use]
    pub fn initial_hash(&self) -> &str {
        &self.initial_hash
    }

    /// Hash of the latest content.
    #[must_use]
    pub fn current_hash(&self) -> &str {
        &self.current_hash
    }

    /// Content that opened the chunk.
    #[must_use]
    pub fn initial_content(&self) -> &[u8] {
        &self.initial_content
    }

    /// Latest observed content.
    #[must_use]
    pub fn latest_content(&self) -> &[u8] {
        &self.latest_content
    }
}
