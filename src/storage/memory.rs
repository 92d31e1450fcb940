//! In-memory backend for tests and ephemeral servers.

use std::collections::HashMap;

use crate::engine::table::Table;
use crate::engine::txn::LogEntry;

use super::{StorageBackend, StorageError};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    databases: HashMap<String, HashMap<String, Table>>,
    logs: HashMap<String, Vec<LogEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries currently mirrored into the open transaction log of `db`.
    pub fn log_entries(&self, db: &str) -> Option<&[LogEntry]> {
        self.logs.get(db).map(|entries| entries.as_slice())
    }

    fn require_db(&self, db: &str) -> Result<&HashMap<String, Table>, StorageError> {
        self.databases
            .get(db)
            .ok_or_else(|| StorageError::DatabaseNotFound(db.to_string()))
    }
}

impl StorageBackend for MemoryBackend {
    fn create_db(&mut self, db: &str) -> Result<(), StorageError> {
        if self.databases.contains_key(db) {
            return Err(StorageError::DatabaseExists(db.to_string()));
        }
        self.databases.insert(db.to_string(), HashMap::new());
        Ok(())
    }

    fn drop_db(&mut self, db: &str) -> Result<(), StorageError> {
        self.databases
            .remove(db)
            .ok_or_else(|| StorageError::DatabaseNotFound(db.to_string()))?;
        self.logs.remove(db);
        Ok(())
    }

    fn list_databases(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.databases.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn list_tables(&self, db: &str) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.require_db(db)?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn load_table(&self, db: &str, table: &str) -> Result<Table, StorageError> {
        self.require_db(db)?
            .get(table)
            .cloned()
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))
    }

    fn save_table(&mut self, db: &str, table: &Table) -> Result<(), StorageError> {
        let tables = self
            .databases
            .get_mut(db)
            .ok_or_else(|| StorageError::DatabaseNotFound(db.to_string()))?;
        tables.insert(table.name.clone(), table.clone());
        Ok(())
    }

    fn drop_table(&mut self, db: &str, table: &str) -> Result<(), StorageError> {
        let tables = self
            .databases
            .get_mut(db)
            .ok_or_else(|| StorageError::DatabaseNotFound(db.to_string()))?;
        tables
            .remove(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        Ok(())
    }

    fn create_log(&mut self, db: &str) -> Result<(), StorageError> {
        self.require_db(db)?;
        self.logs.insert(db.to_string(), Vec::new());
        Ok(())
    }

    fn append_log(&mut self, db: &str, entry: &LogEntry) -> Result<(), StorageError> {
        self.require_db(db)?;
        self.logs.entry(db.to_string()).or_default().push(entry.clone());
        Ok(())
    }

    fn delete_log(&mut self, db: &str) -> Result<(), StorageError> {
        self.logs.remove(db);
        Ok(())
    }
}
