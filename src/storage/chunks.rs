//! `SQLite`-backed chunk store.

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use super::connection::Database;
use crate::chunk::{Chunk, ChunkId, ChunkStore};
use crate::error::StorageError;
use crate::Result;

const SELECT_COLUMNS: &str =
    "SELECT id, file_path, diff, start_time, end_time, hash, manual FROM chunks";

/// Chunk store persisting to the `chunks` table.
#[derive(Debug, Clone)]
pub struct SqliteChunkStore {
    db: Database,
}

impl SqliteChunkStore {
    /// Wrap an already migrated database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Number of stored chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> Result<usize> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                .map_err(|e| StorageError::Database(format!("failed to count chunks: {e}")))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }

    /// Fetch a chunk by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such chunk, or an error if the query fails.
    pub fn get(&self, id: &ChunkId) -> Result<Chunk> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                [id.as_str()],
                row_to_chunk,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StorageError::not_found("chunk", id.as_str()),
                other => StorageError::Database(format!("failed to get chunk: {other}")),
            }
            .into())
        })
    }
}

impl ChunkStore for SqliteChunkStore {
    fn save_chunk(&self, chunk: &Chunk) -> Result<()> {
        self.db.with_conn(|conn| insert_chunk(conn, chunk))
    }

    fn find_chunks(&self, file_path: &str) -> Result<Vec<Chunk>> {
        self.db.with_conn(|conn| {
            query_chunks(
                conn,
                &format!(
                    "{SELECT_COLUMNS} WHERE file_path = ?1 ORDER BY created_at DESC, rowid DESC"
                ),
                params![file_path],
            )
        })
    }

    fn recent_chunks(&self, limit: usize) -> Result<Vec<Chunk>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            query_chunks(
                conn,
                &format!("{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC LIMIT ?1"),
                params![limit],
            )
        })
    }
}

fn insert_chunk(conn: &Connection, chunk: &Chunk) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO chunks
            (id, file_path, diff, start_time, end_time, hash, manual, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            chunk.id.as_str(),
            chunk.file_path,
            chunk.diff,
            chunk.start_time,
            chunk.end_time,
            chunk.hash,
            chunk.manual,
            Utc::now(),
        ],
    )
    .map_err(|e| StorageError::Database(format!("failed to save chunk: {e}")))?;

    tracing::trace!(id = %chunk.id, path = %chunk.file_path, "Saved chunk");
    Ok(())
}

fn query_chunks(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Chunk>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| StorageError::Database(format!("failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map(params, row_to_chunk)
        .map_err(|e| StorageError::Database(format!("failed to query chunks: {e}")))?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| StorageError::Database(format!("failed to read chunk row: {e}")).into())
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: ChunkId::from(row.get::<_, String>(0)?),
        file_path: row.get(1)?,
        diff: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        hash: row.get(5)?,
        manual: row.get(6)?,
    })
}
