//! Transaction state and the in-memory undo log.
//!
//! Each session carries at most one active transaction. While it is active,
//! every DML mutation appends a [`LogEntry`] describing the change; rollback
//! walks the log in reverse and undoes each entry against the in-memory
//! tables. The entries also carry bincode derives so the open-transaction
//! window can be mirrored into the per-database `transaction.log` artifact.

use bincode::{Decode, Encode};
use log::warn;

use super::Database;
use super::table::Row;

/// One undo record, appended in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum LogEntry {
    Begin {
        id: u64,
    },
    Insert {
        table: String,
        row: Row,
    },
    Update {
        table: String,
        row_index: usize,
        old_row: Row,
        new_row: Row,
    },
    Delete {
        table: String,
        row: Row,
    },
    Commit {
        id: u64,
    },
    Rollback {
        id: u64,
    },
}

/// Per-session transaction bookkeeping.
#[derive(Debug, Default, Clone)]
pub struct TxnState {
    active: bool,
    id: u64,
    next_id: u64,
    log: Vec<LogEntry>,
}

impl TxnState {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Opens a fresh log buffer and returns the new transaction id.
    pub fn begin(&mut self) -> u64 {
        self.next_id += 1;
        self.id = self.next_id;
        self.active = true;
        self.log.clear();
        self.log.push(LogEntry::Begin { id: self.id });
        self.id
    }

    /// Appends an undo record; a no-op outside a transaction.
    pub fn record(&mut self, entry: LogEntry) {
        if self.active {
            self.log.push(entry);
        }
    }

    /// Closes the transaction and hands back the accumulated log.
    pub fn finish(&mut self) -> Vec<LogEntry> {
        self.active = false;
        self.id = 0;
        std::mem::take(&mut self.log)
    }
}

/// Undoes `log` against `database`, newest entry first.
pub fn undo(database: &mut Database, log: &[LogEntry]) {
    for entry in log.iter().rev() {
        match entry {
            LogEntry::Insert { table, row } => {
                if let Some(table) = database.tables.get_mut(table) {
                    // Remove the most recent matching row.
                    if let Some(index) = table.rows.iter().rposition(|r| r == row) {
                        table.rows.remove(index);
                    }
                }
            }
            LogEntry::Delete { table, row } => {
                if let Some(table) = database.tables.get_mut(table) {
                    table.rows.push(row.clone());
                }
            }
            LogEntry::Update {
                table,
                row_index,
                old_row,
                ..
            } => {
                if let Some(table) = database.tables.get_mut(table) {
                    if *row_index < table.rows.len() {
                        table.rows[*row_index] = old_row.clone();
                    } else {
                        warn!(
                            "undo skipped: row index {row_index} out of bounds in '{}'",
                            table.name
                        );
                    }
                }
            }
            LogEntry::Begin { .. } | LogEntry::Commit { .. } | LogEntry::Rollback { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::engine::table::Table;
    use crate::protocol::query::{ColumnDef, DataType};

    fn database_with_rows(rows: Vec<Row>) -> Database {
        let mut table = Table::new(
            "users",
            vec![
                ColumnDef::new("id", DataType::Int, true),
                ColumnDef::new("name", DataType::String, false),
            ],
        )
        .unwrap();
        table.rows = rows;

        let mut tables = HashMap::new();
        tables.insert("users".to_string(), table);
        Database {
            name: "test_db".into(),
            tables,
        }
    }

    #[test]
    fn begin_issues_fresh_increasing_ids() {
        let mut txn = TxnState::default();
        assert!(!txn.is_active());

        let first = txn.begin();
        assert!(txn.is_active());
        txn.finish();

        let second = txn.begin();
        assert!(second > first);
    }

    #[test]
    fn record_is_ignored_outside_a_transaction() {
        let mut txn = TxnState::default();
        txn.record(LogEntry::Insert {
            table: "users".into(),
            row: vec!["1".into(), "Alice".into()],
        });
        assert!(txn.finish().is_empty());
    }

    #[test]
    fn undo_insert_removes_the_matching_row() {
        let mut db = database_with_rows(vec![
            vec!["1".into(), "Alice".into()],
            vec!["2".into(), "Bob".into()],
        ]);
        undo(
            &mut db,
            &[LogEntry::Insert {
                table: "users".into(),
                row: vec!["2".into(), "Bob".into()],
            }],
        );
        assert_eq!(db.tables["users"].rows, vec![vec!["1", "Alice"]]);
    }

    #[test]
    fn undo_delete_restores_the_row() {
        let mut db = database_with_rows(vec![]);
        undo(
            &mut db,
            &[LogEntry::Delete {
                table: "users".into(),
                row: vec!["1".into(), "Alice".into()],
            }],
        );
        assert_eq!(db.tables["users"].rows, vec![vec!["1", "Alice"]]);
    }

    #[test]
    fn undo_update_restores_the_old_row() {
        let mut db = database_with_rows(vec![vec!["1".into(), "Alicia".into()]]);
        undo(
            &mut db,
            &[LogEntry::Update {
                table: "users".into(),
                row_index: 0,
                old_row: vec!["1".into(), "Alice".into()],
                new_row: vec!["1".into(), "Alicia".into()],
            }],
        );
        assert_eq!(db.tables["users"].rows, vec![vec!["1", "Alice"]]);
    }

    #[test]
    fn undo_replays_newest_first() {
        let mut db = database_with_rows(vec![]);
        // Insert then update of the same logical row; undo must reverse the
        // update before removing the insert.
        let mut log = Vec::new();
        db.tables.get_mut("users").unwrap().rows =
            vec![vec!["1".into(), "Alicia".into()]];
        log.push(LogEntry::Insert {
            table: "users".into(),
            row: vec!["1".into(), "Alice".into()],
        });
        log.push(LogEntry::Update {
            table: "users".into(),
            row_index: 0,
            old_row: vec!["1".into(), "Alice".into()],
            new_row: vec!["1".into(), "Alicia".into()],
        });

        undo(&mut db, &log);
        assert!(db.tables["users"].rows.is_empty());
    }
}
