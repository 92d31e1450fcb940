//! In-memory table model.
//!
//! A [`Table`] is the unit the engine manipulates: an ordered set of
//! [`ColumnDef`]s plus rows of string cells, one cell per column in
//! declaration order. Construction enforces the schema invariants (unique
//! column names, at most one primary key); the row-level invariants (width,
//! primary-key uniqueness) are enforced by the DML paths that mutate `rows`.

use crate::protocol::query::{ColumnDef, DataType};

use super::EngineError;

/// One row: string cells in column declaration order.
pub type Row = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Row>,
}

impl Table {
    /// Builds an empty table, validating the schema invariants.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Result<Self, EngineError> {
        let name = name.into();
        if name.is_empty() {
            return Err(EngineError::EmptyTableName);
        }
        if columns.is_empty() {
            return Err(EngineError::NoColumns(name));
        }

        let mut primary_keys = 0;
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(EngineError::DuplicateColumn {
                    table: name,
                    column: column.name.clone(),
                });
            }
            if column.is_primary_key {
                primary_keys += 1;
            }
        }
        if primary_keys > 1 {
            return Err(EngineError::MultiplePrimaryKeys(name));
        }

        Ok(Self {
            name,
            columns,
            rows: Vec::new(),
        })
    }

    /// Rebuilds a table from persisted parts without re-validating rows.
    pub fn from_parts(name: impl Into<String>, columns: Vec<ColumnDef>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_type(&self, index: usize) -> Option<DataType> {
        self.columns.get(index).map(|c| c.data_type)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn primary_key_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.is_primary_key)
    }

    /// Checks a candidate primary-key value against every existing row.
    pub fn check_primary_key(&self, value: &str) -> Result<(), EngineError> {
        let Some(pk) = self.primary_key_index() else {
            return Ok(());
        };
        if self.rows.iter().any(|row| row[pk] == value) {
            return Err(EngineError::DuplicatePrimaryKey {
                column: self.columns[pk].name.clone(),
                value: value.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", DataType::Int, true),
            ColumnDef::new("name", DataType::String, false),
            ColumnDef::new("age", DataType::Int, false),
        ]
    }

    #[test]
    fn new_table_validates_schema() {
        let table = Table::new("users", columns()).unwrap();
        assert_eq!(table.primary_key_index(), Some(0));
        assert_eq!(table.column_index("age"), Some(2));
        assert_eq!(table.column_index("missing"), None);
    }

    #[test]
    fn duplicate_column_names_are_rejected() {
        let result = Table::new(
            "users",
            vec![
                ColumnDef::new("id", DataType::Int, false),
                ColumnDef::new("id", DataType::String, false),
            ],
        );
        assert!(matches!(result, Err(EngineError::DuplicateColumn { .. })));
    }

    #[test]
    fn multiple_primary_keys_are_rejected() {
        let result = Table::new(
            "users",
            vec![
                ColumnDef::new("id", DataType::Int, true),
                ColumnDef::new("email", DataType::String, true),
            ],
        );
        assert!(matches!(
            result,
            Err(EngineError::MultiplePrimaryKeys(name)) if name == "users"
        ));
    }

    #[test]
    fn primary_key_check_scans_existing_rows() {
        let mut table = Table::new("users", columns()).unwrap();
        table
            .rows
            .push(vec!["1".into(), "Alice".into(), "25".into()]);

        assert!(table.check_primary_key("2").is_ok());
        assert!(matches!(
            table.check_primary_key("1"),
            Err(EngineError::DuplicatePrimaryKey { column, value })
                if column == "id" && value == "1"
        ));
    }

    #[test]
    fn tables_without_primary_key_accept_any_value() {
        let mut table = Table::new(
            "log",
            vec![ColumnDef::new("line", DataType::String, false)],
        )
        .unwrap();
        table.rows.push(vec!["x".into()]);
        assert!(table.check_primary_key("x").is_ok());
    }
}
