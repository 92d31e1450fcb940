//! Row manipulation: INSERT, SELECT, UPDATE, DELETE.
//!
//! Every mutation appends an undo record to the session's transaction log
//! when one is open. Outside a transaction the touched table is persisted
//! immediately, so disk always matches memory at the moment a transaction
//! begins (which is what makes reload-from-disk an equivalent rollback).

use std::collections::HashMap;

use log::{debug, warn};

use crate::auth::session::Session;
use crate::protocol::query::{DataType, LiteralValue, SetClause};

use super::filter;
use super::table::Row;
use super::txn::LogEntry;
use super::{Engine, EngineError};

/// Output of a SELECT: projected column names plus matching rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Engine {
    /// Inserts one row from positional values. Fewer values than columns is
    /// allowed; the tail is filled with type defaults.
    pub fn insert(
        &mut self,
        session: &mut Session,
        table_name: &str,
        values: &[LiteralValue],
    ) -> Result<usize, EngineError> {
        let database = self.current_database_mut(session)?;
        let table = database
            .tables
            .get_mut(table_name)
            .ok_or_else(|| EngineError::TableNotFound(table_name.to_string()))?;

        if values.len() > table.columns.len() {
            return Err(EngineError::TooManyValues {
                table: table_name.to_string(),
                expected: table.columns.len(),
                got: values.len(),
            });
        }

        let row: Row = table
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| match values.get(i) {
                Some(literal) => literal.value.clone(),
                None => column.data_type.default_value().to_string(),
            })
            .collect();

        self.finish_insert(session, table_name, row)
    }

    /// Inserts one row from a column → value map. Columns absent from the
    /// map get type defaults; map keys that name no column are skipped.
    pub fn insert_named(
        &mut self,
        session: &mut Session,
        table_name: &str,
        values: &HashMap<String, String>,
    ) -> Result<usize, EngineError> {
        let database = self.current_database_mut(session)?;
        let table = database
            .tables
            .get_mut(table_name)
            .ok_or_else(|| EngineError::TableNotFound(table_name.to_string()))?;

        for key in values.keys() {
            if table.column_index(key).is_none() {
                warn!("insert into '{table_name}' names unknown column '{key}', skipping");
            }
        }

        let row: Row = table
            .columns
            .iter()
            .map(|column| {
                values
                    .get(&column.name)
                    .cloned()
                    .unwrap_or_else(|| column.data_type.default_value().to_string())
            })
            .collect();

        self.finish_insert(session, table_name, row)
    }

    fn finish_insert(
        &mut self,
        session: &mut Session,
        table_name: &str,
        row: Row,
    ) -> Result<usize, EngineError> {
        let database = self.current_database_mut(session)?;
        let table = database
            .tables
            .get_mut(table_name)
            .ok_or_else(|| EngineError::TableNotFound(table_name.to_string()))?;

        if let Some(pk) = table.primary_key_index() {
            table.check_primary_key(&row[pk])?;
        }
        table.rows.push(row.clone());
        debug!("inserted 1 row into '{table_name}'");

        self.record_mutation(
            session,
            LogEntry::Insert {
                table: table_name.to_string(),
                row,
            },
        );
        self.persist_outside_txn(session, table_name)?;
        Ok(1)
    }

    /// Overwrites the named columns of every row matching `condition`.
    /// Returns the number of rows touched.
    pub fn update(
        &mut self,
        session: &mut Session,
        table_name: &str,
        assignments: &[SetClause],
        condition: &str,
    ) -> Result<usize, EngineError> {
        let database = self.current_database_mut(session)?;
        let table = database
            .tables
            .get_mut(table_name)
            .ok_or_else(|| EngineError::TableNotFound(table_name.to_string()))?;

        let mut entries = Vec::new();
        let mut affected = 0;
        for index in 0..table.rows.len() {
            if !filter::evaluate(table, &table.rows[index], condition) {
                continue;
            }

            let old_row = table.rows[index].clone();
            for assignment in assignments {
                match table.column_index(&assignment.column) {
                    Some(column) => {
                        table.rows[index][column] = assignment.value.value.clone();
                    }
                    None => warn!(
                        "update names unknown column '{}' in '{table_name}', skipping",
                        assignment.column
                    ),
                }
            }
            entries.push(LogEntry::Update {
                table: table_name.to_string(),
                row_index: index,
                old_row,
                new_row: table.rows[index].clone(),
            });
            affected += 1;
        }

        debug!("updated {affected} row(s) in '{table_name}'");
        for entry in entries {
            self.record_mutation(session, entry);
        }
        if affected > 0 {
            self.persist_outside_txn(session, table_name)?;
        }
        Ok(affected)
    }

    /// Removes every row matching `condition`; returns the count removed.
    pub fn delete(
        &mut self,
        session: &mut Session,
        table_name: &str,
        condition: &str,
    ) -> Result<usize, EngineError> {
        let database = self.current_database_mut(session)?;
        let table = database
            .tables
            .get_mut(table_name)
            .ok_or_else(|| EngineError::TableNotFound(table_name.to_string()))?;

        let mut kept = Vec::with_capacity(table.rows.len());
        let mut removed = Vec::new();
        for row in std::mem::take(&mut table.rows) {
            if filter::evaluate(table, &row, condition) {
                removed.push(row);
            } else {
                kept.push(row);
            }
        }
        table.rows = kept;
        let affected = removed.len();

        debug!("deleted {affected} row(s) from '{table_name}'");
        for row in removed {
            self.record_mutation(
                session,
                LogEntry::Delete {
                    table: table_name.to_string(),
                    row,
                },
            );
        }
        if affected > 0 {
            self.persist_outside_txn(session, table_name)?;
        }
        Ok(affected)
    }

    /// Returns every row matching `condition`, optionally sorted ascending
    /// by `order_by` and projected to `projection` (empty = all columns).
    pub fn select(
        &self,
        session: &Session,
        table_name: &str,
        condition: &str,
        order_by: &str,
        projection: &[String],
    ) -> Result<SelectResult, EngineError> {
        let database = self.current_database(session)?;
        let table = database
            .tables
            .get(table_name)
            .ok_or_else(|| EngineError::TableNotFound(table_name.to_string()))?;

        let mut rows: Vec<Row> = table
            .rows
            .iter()
            .filter(|row| filter::evaluate(table, row, condition))
            .cloned()
            .collect();

        if !order_by.is_empty() {
            match table.column_index(order_by) {
                Some(index) => {
                    let data_type = table.columns[index].data_type;
                    rows.sort_by(|a, b| compare_cells(&a[index], &b[index], data_type));
                }
                None => warn!(
                    "order by names unknown column '{order_by}' in '{table_name}', leaving rows unsorted"
                ),
            }
        }

        if projection.is_empty() {
            return Ok(SelectResult {
                columns: table.column_names(),
                rows,
            });
        }

        let mut indices = Vec::with_capacity(projection.len());
        for name in projection {
            let index = table
                .column_index(name)
                .ok_or_else(|| EngineError::UnknownColumn {
                    table: table_name.to_string(),
                    column: name.clone(),
                })?;
            indices.push(index);
        }
        let rows = rows
            .into_iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(SelectResult {
            columns: projection.to_vec(),
            rows,
        })
    }

    /// Appends the undo record to the session log and the on-disk log
    /// artifact; a no-op outside a transaction.
    fn record_mutation(&mut self, session: &mut Session, entry: LogEntry) {
        if !session.txn.is_active() {
            return;
        }
        if let Some(db_name) = session.current_database.clone() {
            if let Err(e) = self.storage_mut().append_log(&db_name, &entry) {
                warn!("failed to mirror a mutation to the transaction log: {e}");
            }
        }
        session.txn.record(entry);
    }

    fn persist_outside_txn(
        &mut self,
        session: &Session,
        table_name: &str,
    ) -> Result<(), EngineError> {
        if session.txn.is_active() {
            return Ok(());
        }
        let db_name = session
            .current_database
            .clone()
            .ok_or(EngineError::NoDatabaseSelected)?;
        let database = self.current_database(session)?;
        let Some(table) = database.tables.get(table_name) else {
            return Ok(());
        };
        let table = table.clone();
        self.storage_mut().save_table(&db_name, &table)?;
        Ok(())
    }
}

fn compare_cells(a: &str, b: &str, data_type: DataType) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    match data_type {
        DataType::Int => match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
            (Ok(lhs), Ok(rhs)) => lhs.cmp(&rhs),
            // Failed parses sort as equal, leaving their relative order alone.
            _ => Ordering::Equal,
        },
        DataType::Double => match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
            (Ok(lhs), Ok(rhs)) => lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        DataType::String | DataType::Bool => a.cmp(b),
    }
}
