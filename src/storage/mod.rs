//! Pluggable persistence layer.
//!
//! The engine never touches the filesystem directly; it drives a
//! [`StorageBackend`] that knows how to keep databases, table artifacts, and
//! the open-transaction log. The file implementation in [`file`] is the one
//! the server runs with; [`memory`] backs tests that don't need a disk.
//!
//! The only contract a backend must honor is that `save_table` followed by
//! `load_table` round-trips the table exactly.

pub mod file;
pub mod memory;

use std::io;

use thiserror::Error;

use crate::engine::table::Table;
use crate::engine::txn::LogEntry;

pub use file::FileBackend;
pub use memory::MemoryBackend;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database '{0}' already exists in storage")]
    DatabaseExists(String),
    #[error("database '{0}' not found in storage")]
    DatabaseNotFound(String),
    #[error("table '{0}' not found in storage")]
    TableNotFound(String),
    #[error("storage io failure: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode artifact: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode artifact: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// Persistence operations the engine depends on.
pub trait StorageBackend: Send {
    /// Creates the container for a new database.
    fn create_db(&mut self, db: &str) -> Result<(), StorageError>;

    /// Removes a database and everything in it.
    fn drop_db(&mut self, db: &str) -> Result<(), StorageError>;

    /// Names of every database currently in storage.
    fn list_databases(&self) -> Result<Vec<String>, StorageError>;

    /// Names of every table persisted under `db`.
    fn list_tables(&self, db: &str) -> Result<Vec<String>, StorageError>;

    /// Loads one table (metadata and rows).
    fn load_table(&self, db: &str, table: &str) -> Result<Table, StorageError>;

    /// Persists one table, replacing any previous artifacts.
    fn save_table(&mut self, db: &str, table: &Table) -> Result<(), StorageError>;

    /// Removes one table's artifacts.
    fn drop_table(&mut self, db: &str, table: &str) -> Result<(), StorageError>;

    /// Opens (truncating) the transaction log artifact for `db`.
    fn create_log(&mut self, db: &str) -> Result<(), StorageError>;

    /// Appends one entry to the open transaction log.
    fn append_log(&mut self, db: &str, entry: &LogEntry) -> Result<(), StorageError>;

    /// Deletes the transaction log artifact, if present.
    fn delete_log(&mut self, db: &str) -> Result<(), StorageError>;
}
