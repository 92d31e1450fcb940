//! Directory-per-database file backend.
//!
//! Layout under the root:
//!
//! ```text
//! <root>/<db>/<table>.meta   column definitions (bincode)
//! <root>/<db>/<table>.dat    rows (bincode)
//! <root>/<db>/<table>.idx    primary-key column name, if the table has one
//! <root>/<db>/transaction.log  present only while a transaction is open
//! ```
//!
//! All bincode artifacts use the fixed-width big-endian configuration, the
//! same one the wire protocol's persistence-adjacent peers use.

use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use bincode::config::{BigEndian, Configuration, Fixint};
use bincode::{decode_from_slice, encode_into_std_write, encode_to_vec};
use log::{debug, trace};

use crate::engine::table::{Row, Table};
use crate::engine::txn::LogEntry;
use crate::protocol::query::ColumnDef;

use super::{StorageBackend, StorageError};

const META_EXTENSION: &str = "meta";
const DATA_EXTENSION: &str = "dat";
const INDEX_EXTENSION: &str = "idx";
const TXN_LOG_NAME: &str = "transaction.log";

pub struct FileBackend {
    root: PathBuf,
    config: Configuration<BigEndian, Fixint>,
}

impl FileBackend {
    /// Opens (creating if needed) the storage root directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            config: bincode::config::standard()
                .with_big_endian()
                .with_fixed_int_encoding(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn db_dir(&self, db: &str) -> PathBuf {
        self.root.join(db)
    }

    fn table_file(&self, db: &str, table: &str, extension: &str) -> PathBuf {
        self.db_dir(db).join(format!("{table}.{extension}"))
    }

    fn log_file(&self, db: &str) -> PathBuf {
        self.db_dir(db).join(TXN_LOG_NAME)
    }

    fn require_db(&self, db: &str) -> Result<PathBuf, StorageError> {
        let dir = self.db_dir(db);
        if !dir.is_dir() {
            return Err(StorageError::DatabaseNotFound(db.to_string()));
        }
        Ok(dir)
    }
}

impl StorageBackend for FileBackend {
    fn create_db(&mut self, db: &str) -> Result<(), StorageError> {
        let dir = self.db_dir(db);
        if dir.exists() {
            return Err(StorageError::DatabaseExists(db.to_string()));
        }
        debug!("creating database directory {}", dir.display());
        fs::create_dir(&dir)?;
        Ok(())
    }

    fn drop_db(&mut self, db: &str) -> Result<(), StorageError> {
        let dir = self.require_db(db)?;
        debug!("removing database directory {}", dir.display());
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    fn list_databases(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn list_tables(&self, db: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.require_db(db)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == META_EXTENSION) {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn load_table(&self, db: &str, table: &str) -> Result<Table, StorageError> {
        self.require_db(db)?;
        let meta_path = self.table_file(db, table, META_EXTENSION);
        if !meta_path.is_file() {
            return Err(StorageError::TableNotFound(table.to_string()));
        }

        let meta = fs::read(&meta_path)?;
        let (columns, _): (Vec<ColumnDef>, _) = decode_from_slice(&meta, self.config)?;

        let data_path = self.table_file(db, table, DATA_EXTENSION);
        let rows: Vec<Row> = if data_path.is_file() {
            let data = fs::read(&data_path)?;
            decode_from_slice(&data, self.config)?.0
        } else {
            Vec::new()
        };

        trace!("loaded table '{db}.{table}' ({} rows)", rows.len());
        Ok(Table::from_parts(table, columns, rows))
    }

    fn save_table(&mut self, db: &str, table: &Table) -> Result<(), StorageError> {
        self.require_db(db)?;

        let meta = encode_to_vec(&table.columns, self.config)?;
        fs::write(self.table_file(db, &table.name, META_EXTENSION), meta)?;

        let data = encode_to_vec(&table.rows, self.config)?;
        fs::write(self.table_file(db, &table.name, DATA_EXTENSION), data)?;

        let index_path = self.table_file(db, &table.name, INDEX_EXTENSION);
        match table.primary_key_index() {
            Some(pk) => fs::write(index_path, &table.columns[pk].name)?,
            None if index_path.exists() => fs::remove_file(index_path)?,
            None => {}
        }

        trace!("saved table '{db}.{}' ({} rows)", table.name, table.rows.len());
        Ok(())
    }

    fn drop_table(&mut self, db: &str, table: &str) -> Result<(), StorageError> {
        self.require_db(db)?;
        let meta_path = self.table_file(db, table, META_EXTENSION);
        if !meta_path.is_file() {
            return Err(StorageError::TableNotFound(table.to_string()));
        }
        fs::remove_file(meta_path)?;
        for extension in [DATA_EXTENSION, INDEX_EXTENSION] {
            let path = self.table_file(db, table, extension);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn create_log(&mut self, db: &str) -> Result<(), StorageError> {
        self.require_db(db)?;
        File::create(self.log_file(db))?;
        Ok(())
    }

    fn append_log(&mut self, db: &str, entry: &LogEntry) -> Result<(), StorageError> {
        self.require_db(db)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file(db))?;
        let mut writer = BufWriter::new(file);
        encode_into_std_write(entry, &mut writer, self.config)?;
        Ok(())
    }

    fn delete_log(&mut self, db: &str) -> Result<(), StorageError> {
        let path = self.log_file(db);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;
    use crate::protocol::query::DataType;

    fn backend() -> (TempDir, FileBackend) {
        let temp = TempDir::new("sdsql-storage").unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();
        (temp, backend)
    }

    fn sample_table() -> Table {
        let mut table = Table::new(
            "users",
            vec![
                ColumnDef::new("id", DataType::Int, true),
                ColumnDef::new("name", DataType::String, false),
            ],
        )
        .unwrap();
        table.rows = vec![
            vec!["1".into(), "Alice".into()],
            vec!["2".into(), "Bob".into()],
        ];
        table
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_temp, mut backend) = backend();
        backend.create_db("test_db").unwrap();

        let table = sample_table();
        backend.save_table("test_db", &table).unwrap();

        let loaded = backend.load_table("test_db", "users").unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn duplicate_database_is_rejected() {
        let (_temp, mut backend) = backend();
        backend.create_db("test_db").unwrap();
        assert!(matches!(
            backend.create_db("test_db"),
            Err(StorageError::DatabaseExists(name)) if name == "test_db"
        ));
    }

    #[test]
    fn drop_db_removes_every_artifact() {
        let (temp, mut backend) = backend();
        backend.create_db("test_db").unwrap();
        backend.save_table("test_db", &sample_table()).unwrap();
        backend.drop_db("test_db").unwrap();

        assert!(!temp.path().join("test_db").exists());
        assert!(matches!(
            backend.list_tables("test_db"),
            Err(StorageError::DatabaseNotFound(_))
        ));
    }

    #[test]
    fn list_tables_finds_metadata_artifacts() {
        let (_temp, mut backend) = backend();
        backend.create_db("test_db").unwrap();
        backend.save_table("test_db", &sample_table()).unwrap();

        let mut other = sample_table();
        other.name = "orders".into();
        backend.save_table("test_db", &other).unwrap();

        assert_eq!(
            backend.list_tables("test_db").unwrap(),
            vec!["orders".to_string(), "users".to_string()]
        );
    }

    #[test]
    fn databases_survive_a_reopen() {
        let (temp, mut backend) = backend();
        backend.create_db("test_db").unwrap();
        backend.save_table("test_db", &sample_table()).unwrap();
        drop(backend);

        let reopened = FileBackend::open(temp.path()).unwrap();
        assert_eq!(reopened.list_databases().unwrap(), vec!["test_db"]);
        assert_eq!(
            reopened.load_table("test_db", "users").unwrap(),
            sample_table()
        );
    }

    #[test]
    fn primary_key_index_artifact_tracks_the_schema() {
        let (temp, mut backend) = backend();
        backend.create_db("test_db").unwrap();
        backend.save_table("test_db", &sample_table()).unwrap();

        let index = temp.path().join("test_db").join("users.idx");
        assert_eq!(fs::read_to_string(&index).unwrap(), "id");

        let mut keyless = sample_table();
        keyless.columns[0].is_primary_key = false;
        backend.save_table("test_db", &keyless).unwrap();
        assert!(!index.exists());
    }

    #[test]
    fn transaction_log_lives_only_while_open() {
        let (temp, mut backend) = backend();
        backend.create_db("test_db").unwrap();
        let log = temp.path().join("test_db").join("transaction.log");

        backend.create_log("test_db").unwrap();
        assert!(log.exists());

        backend
            .append_log(
                "test_db",
                &LogEntry::Insert {
                    table: "users".into(),
                    row: vec!["1".into(), "Alice".into()],
                },
            )
            .unwrap();
        assert!(log.metadata().unwrap().len() > 0);

        backend.delete_log("test_db").unwrap();
        assert!(!log.exists());
    }

    #[test]
    fn drop_table_removes_meta_data_and_index() {
        let (temp, mut backend) = backend();
        backend.create_db("test_db").unwrap();
        backend.save_table("test_db", &sample_table()).unwrap();
        backend.drop_table("test_db", "users").unwrap();

        for extension in ["meta", "dat", "idx"] {
            assert!(!temp.path().join("test_db").join(format!("users.{extension}")).exists());
        }
        assert!(matches!(
            backend.load_table("test_db", "users"),
            Err(StorageError::TableNotFound(_))
        ));
    }
}
