//! The query engine.
//!
//! One [`Engine`] value owns the whole in-memory catalog (databases, tables,
//! rows) together with the storage backend that persists it. Sessions are
//! passed in by the caller: the engine reads the session's current database
//! and transaction state but never owns sessions itself.
//!
//! DDL lives here; DML is in [`dml`], the condition evaluator in [`filter`],
//! transaction bookkeeping in [`txn`].

pub mod dml;
pub mod filter;
pub mod table;
pub mod txn;

use std::collections::HashMap;

use log::{debug, info, warn};
use thiserror::Error;

use crate::auth::session::Session;
use crate::protocol::query::ColumnDef;
use crate::storage::{StorageBackend, StorageError};

use table::Table;
use txn::LogEntry;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("database name cannot be empty")]
    EmptyDatabaseName,
    #[error("database '{0}' already exists")]
    DatabaseExists(String),
    #[error("database '{0}' does not exist")]
    DatabaseNotFound(String),
    #[error("no database selected")]
    NoDatabaseSelected,
    #[error("table name cannot be empty")]
    EmptyTableName,
    #[error("table '{0}' must have at least one column")]
    NoColumns(String),
    #[error("table '{0}' already exists")]
    TableExists(String),
    #[error("table '{0}' does not exist")]
    TableNotFound(String),
    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },
    #[error("table '{0}' defines more than one primary key")]
    MultiplePrimaryKeys(String),
    #[error("duplicate primary key value '{value}' for column '{column}'")]
    DuplicatePrimaryKey { column: String, value: String },
    #[error("table '{table}' has {expected} columns but {got} values were provided")]
    TooManyValues {
        table: String,
        expected: usize,
        got: usize,
    },
    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },
    #[error("transaction {0} is already active")]
    TransactionActive(u64),
    #[error("no active transaction")]
    NoActiveTransaction,
    #[error("commit incomplete, on-disk state may be inconsistent: {0}")]
    CommitIncomplete(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One named database: a set of tables keyed by name.
#[derive(Debug, Default)]
pub struct Database {
    pub name: String,
    pub tables: HashMap<String, Table>,
}

/// The owned engine: catalog plus storage backend.
pub struct Engine {
    databases: HashMap<String, Database>,
    storage: Box<dyn StorageBackend>,
}

impl Engine {
    /// Builds an engine over `storage`, discovering the databases it already
    /// holds. Tables are loaded lazily when a session selects a database.
    pub fn new(storage: Box<dyn StorageBackend>) -> Result<Self, EngineError> {
        let mut databases = HashMap::new();
        for name in storage.list_databases()? {
            databases.insert(
                name.clone(),
                Database {
                    name,
                    tables: HashMap::new(),
                },
            );
        }
        info!("engine initialized with {} database(s)", databases.len());
        Ok(Self { databases, storage })
    }

    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.keys().cloned().collect();
        names.sort();
        names
    }

    // --- DDL ---

    pub fn create_database(&mut self, name: &str) -> Result<(), EngineError> {
        if name.is_empty() {
            return Err(EngineError::EmptyDatabaseName);
        }
        if self.databases.contains_key(name) {
            return Err(EngineError::DatabaseExists(name.to_string()));
        }

        self.storage.create_db(name)?;
        self.databases.insert(
            name.to_string(),
            Database {
                name: name.to_string(),
                tables: HashMap::new(),
            },
        );
        info!("created database '{name}'");
        Ok(())
    }

    pub fn drop_database(&mut self, name: &str, session: &mut Session) -> Result<(), EngineError> {
        if !self.databases.contains_key(name) {
            return Err(EngineError::DatabaseNotFound(name.to_string()));
        }

        self.storage.drop_db(name)?;
        self.databases.remove(name);

        if session.current_database.as_deref() == Some(name) {
            if session.txn.is_active() {
                warn!("dropping database '{name}' discards the session's open transaction");
                session.txn.finish();
            }
            session.current_database = None;
        }
        info!("dropped database '{name}'");
        Ok(())
    }

    /// Selects `name` as the session's current database and eagerly loads
    /// every table it has in storage.
    pub fn use_database(&mut self, name: &str, session: &mut Session) -> Result<(), EngineError> {
        if !self.databases.contains_key(name) {
            return Err(EngineError::DatabaseNotFound(name.to_string()));
        }

        let mut tables = HashMap::new();
        for table_name in self.storage.list_tables(name)? {
            let table = self.storage.load_table(name, &table_name)?;
            tables.insert(table_name, table);
        }
        debug!("loaded {} table(s) for database '{name}'", tables.len());

        let database = self.databases.get_mut(name).expect("checked above");
        database.tables = tables;
        session.current_database = Some(name.to_string());
        Ok(())
    }

    pub fn create_table(
        &mut self,
        session: &Session,
        name: &str,
        columns: Vec<ColumnDef>,
    ) -> Result<(), EngineError> {
        let db_name = current_db_name(session)?.to_string();
        let database = self
            .databases
            .get_mut(&db_name)
            .ok_or_else(|| EngineError::DatabaseNotFound(db_name.clone()))?;

        if database.tables.contains_key(name) {
            return Err(EngineError::TableExists(name.to_string()));
        }

        let table = Table::new(name, columns)?;
        self.storage.save_table(&db_name, &table)?;
        database.tables.insert(name.to_string(), table);
        info!("created table '{db_name}.{name}'");
        Ok(())
    }

    pub fn drop_table(&mut self, session: &Session, name: &str) -> Result<(), EngineError> {
        let db_name = current_db_name(session)?.to_string();
        let database = self
            .databases
            .get_mut(&db_name)
            .ok_or_else(|| EngineError::DatabaseNotFound(db_name.clone()))?;

        if database.tables.remove(name).is_none() {
            return Err(EngineError::TableNotFound(name.to_string()));
        }
        self.storage.drop_table(&db_name, name)?;
        info!("dropped table '{db_name}.{name}'");
        Ok(())
    }

    // --- Transactions ---

    /// Opens a transaction for the session and its current database.
    pub fn begin_transaction(&mut self, session: &mut Session) -> Result<u64, EngineError> {
        if session.txn.is_active() {
            return Err(EngineError::TransactionActive(session.txn.id()));
        }
        let db_name = current_db_name(session)?.to_string();

        self.storage.create_log(&db_name)?;
        let id = session.txn.begin();
        if let Err(e) = self.storage.append_log(&db_name, &LogEntry::Begin { id }) {
            warn!("failed to mirror BEGIN to the transaction log: {e}");
        }
        info!("transaction {id} started on '{db_name}'");
        Ok(id)
    }

    /// Persists every table of the current database, then closes the
    /// transaction. A persistence failure aborts the transaction and is
    /// reported as [`EngineError::CommitIncomplete`].
    pub fn commit(&mut self, session: &mut Session) -> Result<(), EngineError> {
        if !session.txn.is_active() {
            return Err(EngineError::NoActiveTransaction);
        }
        let id = session.txn.id();
        let db_name = current_db_name(session)?.to_string();

        if let Err(e) = self.storage.append_log(&db_name, &LogEntry::Commit { id }) {
            warn!("failed to mirror COMMIT to the transaction log: {e}");
        }

        let database = self
            .databases
            .get(&db_name)
            .ok_or_else(|| EngineError::DatabaseNotFound(db_name.clone()))?;

        let mut failure = None;
        for table in database.tables.values() {
            if let Err(e) = self.storage.save_table(&db_name, table) {
                failure = Some(format!("table '{}': {e}", table.name));
                break;
            }
        }

        session.txn.finish();
        if let Err(e) = self.storage.delete_log(&db_name) {
            warn!("failed to remove the transaction log: {e}");
        }

        match failure {
            Some(reason) => Err(EngineError::CommitIncomplete(reason)),
            None => {
                info!("transaction {id} committed on '{db_name}'");
                Ok(())
            }
        }
    }

    /// Undoes the transaction's log in reverse against the in-memory tables.
    pub fn rollback(&mut self, session: &mut Session) -> Result<(), EngineError> {
        if !session.txn.is_active() {
            return Err(EngineError::NoActiveTransaction);
        }
        let id = session.txn.id();
        let db_name = current_db_name(session)?.to_string();

        let log = session.txn.finish();
        if let Some(database) = self.databases.get_mut(&db_name) {
            txn::undo(database, &log);
        }
        if let Err(e) = self.storage.delete_log(&db_name) {
            warn!("failed to remove the transaction log: {e}");
        }
        info!("transaction {id} rolled back on '{db_name}'");
        Ok(())
    }

    /// Disconnect path: rolls back silently when a transaction is open.
    pub fn rollback_if_active(&mut self, session: &mut Session) {
        if session.txn.is_active() {
            let id = session.txn.id();
            warn!("session for '{}' disconnected with transaction {id} open, rolling back", session.user);
            if let Err(e) = self.rollback(session) {
                warn!("automatic rollback failed: {e}");
            }
        }
    }

    // --- Shared lookups ---

    pub(crate) fn current_database(&self, session: &Session) -> Result<&Database, EngineError> {
        let name = current_db_name(session)?;
        self.databases
            .get(name)
            .ok_or_else(|| EngineError::DatabaseNotFound(name.to_string()))
    }

    pub(crate) fn current_database_mut(
        &mut self,
        session: &Session,
    ) -> Result<&mut Database, EngineError> {
        let name = current_db_name(session)?;
        self.databases
            .get_mut(name)
            .ok_or_else(|| EngineError::DatabaseNotFound(name.to_string()))
    }

    pub(crate) fn storage_mut(&mut self) -> &mut dyn StorageBackend {
        self.storage.as_mut()
    }
}

fn current_db_name(session: &Session) -> Result<&str, EngineError> {
    session
        .current_database
        .as_deref()
        .ok_or(EngineError::NoDatabaseSelected)
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;
    use crate::protocol::query::DataType;
    use crate::storage::{FileBackend, MemoryBackend};

    fn engine() -> Engine {
        Engine::new(Box::new(MemoryBackend::new())).unwrap()
    }

    fn session() -> Session {
        Session::new("test-token", "admin")
    }

    fn user_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", DataType::Int, true),
            ColumnDef::new("name", DataType::String, false),
        ]
    }

    #[test]
    fn create_database_rejects_empty_and_duplicate_names() {
        let mut engine = engine();
        assert!(matches!(
            engine.create_database(""),
            Err(EngineError::EmptyDatabaseName)
        ));

        engine.create_database("test_db").unwrap();
        assert!(matches!(
            engine.create_database("test_db"),
            Err(EngineError::DatabaseExists(_))
        ));
    }

    #[test]
    fn use_database_requires_existence() {
        let mut engine = engine();
        let mut session = session();
        assert!(matches!(
            engine.use_database("ghost", &mut session),
            Err(EngineError::DatabaseNotFound(_))
        ));

        engine.create_database("test_db").unwrap();
        engine.use_database("test_db", &mut session).unwrap();
        assert_eq!(session.current_database.as_deref(), Some("test_db"));
    }

    #[test]
    fn drop_database_clears_the_sessions_selection() {
        let mut engine = engine();
        let mut session = session();
        engine.create_database("test_db").unwrap();
        engine.use_database("test_db", &mut session).unwrap();

        engine.drop_database("test_db", &mut session).unwrap();
        assert_eq!(session.current_database, None);
        assert!(engine.database_names().is_empty());
    }

    #[test]
    fn create_table_requires_a_selected_database() {
        let mut engine = engine();
        let session = session();
        assert!(matches!(
            engine.create_table(&session, "users", user_columns()),
            Err(EngineError::NoDatabaseSelected)
        ));
    }

    #[test]
    fn create_and_drop_table() {
        let mut engine = engine();
        let mut session = session();
        engine.create_database("test_db").unwrap();
        engine.use_database("test_db", &mut session).unwrap();

        engine
            .create_table(&session, "users", user_columns())
            .unwrap();
        assert!(matches!(
            engine.create_table(&session, "users", user_columns()),
            Err(EngineError::TableExists(_))
        ));

        engine.drop_table(&session, "users").unwrap();
        assert!(matches!(
            engine.drop_table(&session, "users"),
            Err(EngineError::TableNotFound(_))
        ));
    }

    #[test]
    fn catalog_survives_engine_reopen() {
        let temp = TempDir::new("sdsql-engine").unwrap();
        let mut session = session();

        {
            let backend = FileBackend::open(temp.path()).unwrap();
            let mut engine = Engine::new(Box::new(backend)).unwrap();
            engine.create_database("school").unwrap();
            engine.use_database("school", &mut session).unwrap();
            engine
                .create_table(&session, "students", user_columns())
                .unwrap();
        }

        let backend = FileBackend::open(temp.path()).unwrap();
        let mut engine = Engine::new(Box::new(backend)).unwrap();
        assert_eq!(engine.database_names(), vec!["school"]);

        let mut session = Session::new("test-token", "admin");
        engine.use_database("school", &mut session).unwrap();
        let database = engine.current_database(&session).unwrap();
        assert!(database.tables.contains_key("students"));
    }

    #[test]
    fn begin_requires_database_and_exclusivity() {
        let mut engine = engine();
        let mut session = session();
        assert!(matches!(
            engine.begin_transaction(&mut session),
            Err(EngineError::NoDatabaseSelected)
        ));

        engine.create_database("test_db").unwrap();
        engine.use_database("test_db", &mut session).unwrap();

        engine.begin_transaction(&mut session).unwrap();
        assert!(matches!(
            engine.begin_transaction(&mut session),
            Err(EngineError::TransactionActive(_))
        ));
    }

    #[test]
    fn commit_and_rollback_require_an_active_transaction() {
        let mut engine = engine();
        let mut session = session();
        engine.create_database("test_db").unwrap();
        engine.use_database("test_db", &mut session).unwrap();

        assert!(matches!(
            engine.commit(&mut session),
            Err(EngineError::NoActiveTransaction)
        ));
        assert!(matches!(
            engine.rollback(&mut session),
            Err(EngineError::NoActiveTransaction)
        ));
    }
}
