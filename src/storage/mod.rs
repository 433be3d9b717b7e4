//! `SQLite` and in-memory persistence for finalized chunks.

mod chunks;
mod connection;
mod memory;
mod schema;

pub use chunks::SqliteChunkStore;
pub use connection::Database;
pub use memory::MemoryChunkStore;
pub use schema::{current_version, migrate, verify_schema, SCHEMA_VERSION};

/// Initialize storage with migrations.
///
/// # Errors
///
/// Returns an error if database initialization fails.
pub fn init_storage(db: &Database) -> crate::Result<()> {
    db.with_conn(|conn| {
        migrate(conn)?;
        verify_schema(conn)?;

        tracing::info!(path = db.path(), "Storage initialized, schema version {SCHEMA_VERSION}");
        Ok(())
    })
}
