//! Client-side structured commands.
//!
//! The REPL parses a line of input into a [`Command`], and each command maps
//! 1:1 onto a [`QueryRequest`] for the wire. The textual form accepted here
//! is a deliberately small subset of SQL: one statement, no joins, no
//! parentheses in conditions. A richer parser can sit in front of this
//! module without touching anything below it.
//!
//! # Example
//! ```rust
//! use sdsql::Command;
//!
//! let cmd: Command = "use school".try_into().unwrap();
//! assert_eq!(cmd, Command::UseDatabase { name: "school".into() });
//! ```

use thiserror::Error;

use crate::protocol::query::{
    ColumnDef, DataType, LiteralValue, Operation, QueryRequest, SetClause, WhereCondition,
};

/// List of possible errors when parsing a command line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidArguments { command: String, reason: String },

    #[error("unknown column type '{0}', expected int, double, string or bool")]
    UnknownColumnType(String),

    #[error("no command provided")]
    Empty,
}

/// One statement the client can issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateDatabase {
        name: String,
    },
    DropDatabase {
        name: String,
    },
    UseDatabase {
        name: String,
    },
    CreateTable {
        name: String,
        columns: Vec<ColumnDef>,
    },
    DropTable {
        name: String,
    },
    Insert {
        table: String,
        values: Vec<LiteralValue>,
    },
    /// Empty `columns` selects every column.
    Select {
        table: String,
        columns: Vec<String>,
        where_condition: Option<WhereCondition>,
    },
    Update {
        table: String,
        assignments: Vec<SetClause>,
        where_condition: Option<WhereCondition>,
    },
    Delete {
        table: String,
        where_condition: Option<WhereCondition>,
    },
}

impl From<Command> for QueryRequest {
    fn from(command: Command) -> Self {
        match command {
            Command::CreateDatabase { name } => {
                let mut request = QueryRequest::new(Operation::CreateDatabase);
                request.database_name = name;
                request
            }
            Command::DropDatabase { name } => {
                let mut request = QueryRequest::new(Operation::DropDatabase);
                request.database_name = name;
                request
            }
            Command::UseDatabase { name } => {
                let mut request = QueryRequest::new(Operation::UseDatabase);
                request.database_name = name;
                request
            }
            Command::CreateTable { name, columns } => {
                let mut request = QueryRequest::new(Operation::CreateTable);
                request.table_name = name;
                request.columns = columns;
                request
            }
            Command::DropTable { name } => {
                let mut request = QueryRequest::new(Operation::DropTable);
                request.table_name = name;
                request
            }
            Command::Insert { table, values } => {
                let mut request = QueryRequest::new(Operation::Insert);
                request.table_name = table;
                request.insert_values = values;
                request
            }
            Command::Select {
                table,
                columns,
                where_condition,
            } => {
                let mut request = QueryRequest::new(Operation::Select);
                request.table_name = table;
                request.select_columns = columns;
                request.where_condition = where_condition;
                request
            }
            Command::Update {
                table,
                assignments,
                where_condition,
            } => {
                let mut request = QueryRequest::new(Operation::Update);
                request.table_name = table;
                request.update_clauses = assignments;
                request.where_condition = where_condition;
                request
            }
            Command::Delete {
                table,
                where_condition,
            } => {
                let mut request = QueryRequest::new(Operation::Delete);
                request.table_name = table;
                request.where_condition = where_condition;
                request
            }
        }
    }
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&keyword) = tokens.first() else {
            return Err(CommandError::Empty);
        };

        match keyword.to_lowercase().as_str() {
            "create" => match tokens.get(1).map(|t| t.to_lowercase()).as_deref() {
                Some("database") => Ok(Command::CreateDatabase {
                    name: required(&tokens, 2, "create database", "a database name")?,
                }),
                Some("table") => parse_create_table(&tokens),
                _ => Err(CommandError::InvalidArguments {
                    command: "create".into(),
                    reason: "expected 'database' or 'table'".into(),
                }),
            },
            "drop" => match tokens.get(1).map(|t| t.to_lowercase()).as_deref() {
                Some("database") => Ok(Command::DropDatabase {
                    name: required(&tokens, 2, "drop database", "a database name")?,
                }),
                Some("table") => Ok(Command::DropTable {
                    name: required(&tokens, 2, "drop table", "a table name")?,
                }),
                _ => Err(CommandError::InvalidArguments {
                    command: "drop".into(),
                    reason: "expected 'database' or 'table'".into(),
                }),
            },
            "use" => Ok(Command::UseDatabase {
                name: required(&tokens, 1, "use", "a database name")?,
            }),
            "insert" => {
                let table = required(&tokens, 1, "insert", "a table name")?;
                let values = tokens[2..].iter().map(|t| parse_literal(t)).collect();
                Ok(Command::Insert { table, values })
            }
            "select" => parse_select(&tokens),
            "update" => parse_update(&tokens),
            "delete" => {
                let table = required(&tokens, 1, "delete", "a table name")?;
                let where_condition = parse_where(&tokens[2..])?;
                Ok(Command::Delete {
                    table,
                    where_condition,
                })
            }
            _ => Err(CommandError::UnrecognizedCommand(keyword.to_string())),
        }
    }
}

fn required(
    tokens: &[&str],
    index: usize,
    command: &str,
    what: &str,
) -> Result<String, CommandError> {
    tokens
        .get(index)
        .map(|t| t.to_string())
        .ok_or_else(|| CommandError::InvalidArguments {
            command: command.to_string(),
            reason: format!("expected {what}"),
        })
}

/// `create table <name> <col>:<type>[:pk] ...`
fn parse_create_table(tokens: &[&str]) -> Result<Command, CommandError> {
    let name = required(tokens, 2, "create table", "a table name")?;
    if tokens.len() < 4 {
        return Err(CommandError::InvalidArguments {
            command: "create table".into(),
            reason: "expected at least one column as name:type[:pk]".into(),
        });
    }

    let mut columns = Vec::new();
    for definition in &tokens[3..] {
        let mut parts = definition.split(':');
        let column = parts.next().unwrap_or_default();
        let type_name = parts.next().unwrap_or_default();
        let data_type = match type_name.to_lowercase().as_str() {
            "int" => DataType::Int,
            "double" => DataType::Double,
            "string" => DataType::String,
            "bool" => DataType::Bool,
            other => return Err(CommandError::UnknownColumnType(other.to_string())),
        };
        let is_primary_key = parts.next().is_some_and(|p| p.eq_ignore_ascii_case("pk"));
        columns.push(ColumnDef::new(column, data_type, is_primary_key));
    }
    Ok(Command::CreateTable { name, columns })
}

/// `select <table> [cols a,b,c] [where <col> <op> <value>]`
fn parse_select(tokens: &[&str]) -> Result<Command, CommandError> {
    let table = required(tokens, 1, "select", "a table name")?;
    let mut columns = Vec::new();
    let mut rest = &tokens[2..];

    if rest.first().is_some_and(|t| t.eq_ignore_ascii_case("cols")) {
        let list = rest.get(1).ok_or_else(|| CommandError::InvalidArguments {
            command: "select".into(),
            reason: "expected a comma-separated column list after 'cols'".into(),
        })?;
        columns = list.split(',').map(|c| c.trim().to_string()).collect();
        rest = &rest[2..];
    }

    let where_condition = parse_where(rest)?;
    Ok(Command::Select {
        table,
        columns,
        where_condition,
    })
}

/// `update <table> set a=1,b='x' [where <col> <op> <value>]`
fn parse_update(tokens: &[&str]) -> Result<Command, CommandError> {
    let table = required(tokens, 1, "update", "a table name")?;
    if !tokens.get(2).is_some_and(|t| t.eq_ignore_ascii_case("set")) {
        return Err(CommandError::InvalidArguments {
            command: "update".into(),
            reason: "expected 'set' followed by column=value assignments".into(),
        });
    }
    let list = tokens.get(3).ok_or_else(|| CommandError::InvalidArguments {
        command: "update".into(),
        reason: "expected column=value assignments after 'set'".into(),
    })?;

    let mut assignments = Vec::new();
    for pair in list.split(',') {
        let Some((column, value)) = pair.split_once('=') else {
            return Err(CommandError::InvalidArguments {
                command: "update".into(),
                reason: format!("assignment '{pair}' is not of the form column=value"),
            });
        };
        assignments.push(SetClause::new(column.trim(), parse_literal(value.trim())));
    }

    let where_condition = parse_where(&tokens[4..])?;
    Ok(Command::Update {
        table,
        assignments,
        where_condition,
    })
}

/// `where <column> <op> <value>`, or nothing.
fn parse_where(tokens: &[&str]) -> Result<Option<WhereCondition>, CommandError> {
    let Some(first) = tokens.first() else {
        return Ok(None);
    };
    if !first.eq_ignore_ascii_case("where") {
        return Err(CommandError::InvalidArguments {
            command: "where".into(),
            reason: format!("unexpected trailing input '{first}'"),
        });
    }
    if tokens.len() < 4 {
        return Err(CommandError::InvalidArguments {
            command: "where".into(),
            reason: "expected column, operator and value".into(),
        });
    }
    Ok(Some(WhereCondition::new(
        tokens[1],
        tokens[2],
        parse_literal(tokens[3]),
    )))
}

/// Infers a literal's type from its shape: quoted → STRING, numeric →
/// INT/DOUBLE, true/false → BOOL, anything else → STRING.
fn parse_literal(token: &str) -> LiteralValue {
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        return LiteralValue::new(DataType::String, &token[1..token.len() - 1]);
    }
    if token.parse::<i64>().is_ok() {
        return LiteralValue::new(DataType::Int, token);
    }
    if token.parse::<f64>().is_ok() {
        return LiteralValue::new(DataType::Double, token);
    }
    if token.eq_ignore_ascii_case("true") || token.eq_ignore_ascii_case("false") {
        return LiteralValue::new(DataType::Bool, token.to_lowercase());
    }
    LiteralValue::new(DataType::String, token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_commands_parse() {
        let inputs = vec![
            (
                "create database school",
                Command::CreateDatabase {
                    name: "school".into(),
                },
            ),
            (
                "drop database school",
                Command::DropDatabase {
                    name: "school".into(),
                },
            ),
            (
                "use school",
                Command::UseDatabase {
                    name: "school".into(),
                },
            ),
            (
                "drop table users",
                Command::DropTable {
                    name: "users".into(),
                },
            ),
        ];

        for (line, expected) in inputs {
            let command: Command = line.try_into().unwrap();
            assert_eq!(command, expected);
        }
    }

    #[test]
    fn create_table_parses_column_specs() {
        let command: Command = "create table users id:int:pk name:string age:int"
            .try_into()
            .unwrap();
        assert_eq!(
            command,
            Command::CreateTable {
                name: "users".into(),
                columns: vec![
                    ColumnDef::new("id", DataType::Int, true),
                    ColumnDef::new("name", DataType::String, false),
                    ColumnDef::new("age", DataType::Int, false),
                ],
            }
        );
    }

    #[test]
    fn insert_infers_literal_types() {
        let command: Command = "insert users 1 'Alice' 2.5 true".try_into().unwrap();
        assert_eq!(
            command,
            Command::Insert {
                table: "users".into(),
                values: vec![
                    LiteralValue::new(DataType::Int, "1"),
                    LiteralValue::new(DataType::String, "Alice"),
                    LiteralValue::new(DataType::Double, "2.5"),
                    LiteralValue::new(DataType::Bool, "true"),
                ],
            }
        );
    }

    #[test]
    fn select_with_projection_and_where() {
        let command: Command = "select users cols id,name where age > 25".try_into().unwrap();
        assert_eq!(
            command,
            Command::Select {
                table: "users".into(),
                columns: vec!["id".into(), "name".into()],
                where_condition: Some(WhereCondition::new(
                    "age",
                    ">",
                    LiteralValue::new(DataType::Int, "25"),
                )),
            }
        );
    }

    #[test]
    fn update_parses_assignments() {
        let command: Command = "update users set age=26,name='Ann' where id = 1"
            .try_into()
            .unwrap();
        assert_eq!(
            command,
            Command::Update {
                table: "users".into(),
                assignments: vec![
                    SetClause::new("age", LiteralValue::new(DataType::Int, "26")),
                    SetClause::new("name", LiteralValue::new(DataType::String, "Ann")),
                ],
                where_condition: Some(WhereCondition::new(
                    "id",
                    "=",
                    LiteralValue::new(DataType::Int, "1"),
                )),
            }
        );
    }

    #[test]
    fn bad_input_is_reported() {
        assert_eq!(Command::try_from(""), Err(CommandError::Empty));
        assert!(matches!(
            Command::try_from("explode users"),
            Err(CommandError::UnrecognizedCommand(_))
        ));
        assert!(matches!(
            Command::try_from("create table users id:blob"),
            Err(CommandError::UnknownColumnType(_))
        ));
        assert!(matches!(
            Command::try_from("delete users where id"),
            Err(CommandError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn commands_map_onto_query_requests() {
        let command: Command = "select users where name = 'Alice'".try_into().unwrap();
        let request: QueryRequest = command.into();

        assert_eq!(request.operation, Operation::Select);
        assert_eq!(request.table_name, "users");
        assert!(request.select_columns.is_empty());
        assert_eq!(
            request.where_condition,
            Some(WhereCondition::new(
                "name",
                "=",
                LiteralValue::new(DataType::String, "Alice"),
            ))
        );

        let command: Command = "create database school".try_into().unwrap();
        let request: QueryRequest = command.into();
        assert_eq!(request.operation, Operation::CreateDatabase);
        assert_eq!(request.database_name, "school");
        assert_eq!(request.object_name(), "school");
    }
}
