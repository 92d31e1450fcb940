//! Structured query payloads.
//!
//! A [`QueryRequest`] is the wire form of one parsed statement: an operation
//! discriminator plus whichever argument groups that operation uses (column
//! definitions for CREATE TABLE, literals for INSERT, set clauses for UPDATE,
//! an optional WHERE comparison). A [`QueryResponse`] carries either a result
//! grid or an error message back to the client.
//!
//! All layouts follow the framing rules of [`codec`](super::codec): element
//! counts are `u32`, discriminators are `u8`, strings are length-prefixed.

use std::fmt;

use bincode::{Decode, Encode};

use super::codec::{Deserializer, SerializationError, Serializer};

/// Statement discriminator carried in every [`QueryRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operation {
    CreateDatabase = 0x01,
    DropDatabase = 0x02,
    UseDatabase = 0x03,
    CreateTable = 0x04,
    DropTable = 0x05,
    Insert = 0x10,
    Select = 0x11,
    Update = 0x12,
    Delete = 0x13,
}

impl Operation {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::CreateDatabase),
            0x02 => Some(Self::DropDatabase),
            0x03 => Some(Self::UseDatabase),
            0x04 => Some(Self::CreateTable),
            0x05 => Some(Self::DropTable),
            0x10 => Some(Self::Insert),
            0x11 => Some(Self::Select),
            0x12 => Some(Self::Update),
            0x13 => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateDatabase => "CREATE DATABASE",
            Self::DropDatabase => "DROP DATABASE",
            Self::UseDatabase => "USE DATABASE",
            Self::CreateTable => "CREATE TABLE",
            Self::DropTable => "DROP TABLE",
            Self::Insert => "INSERT",
            Self::Select => "SELECT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        };
        write!(f, "{name}")
    }
}

/// Column value types. Values always travel as strings; the type drives
/// comparison and default-value behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
#[repr(u8)]
pub enum DataType {
    Int = 0x01,
    Double = 0x02,
    String = 0x03,
    Bool = 0x04,
}

impl DataType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Int),
            0x02 => Some(Self::Double),
            0x03 => Some(Self::String),
            0x04 => Some(Self::Bool),
            _ => None,
        }
    }

    /// Fill value for columns an INSERT leaves unspecified.
    pub fn default_value(&self) -> &'static str {
        match self {
            Self::Int => "0",
            Self::Double => "0.0",
            Self::String => "",
            Self::Bool => "0",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "INT",
            Self::Double => "DOUBLE",
            Self::String => "STRING",
            Self::Bool => "BOOL",
        };
        write!(f, "{name}")
    }
}

/// A typed literal: `u8 type, string value` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralValue {
    pub data_type: DataType,
    pub value: String,
}

impl LiteralValue {
    pub fn new(data_type: DataType, value: impl Into<String>) -> Self {
        Self {
            data_type,
            value: value.into(),
        }
    }

    pub fn encode(&self, s: &mut Serializer) -> Result<(), SerializationError> {
        s.write_u8(self.data_type as u8);
        s.write_string(&self.value)
    }

    pub fn decode(d: &mut Deserializer) -> Result<Self, SerializationError> {
        let data_type =
            DataType::from_u8(d.read_u8()?).ok_or(SerializationError::InvalidFormat)?;
        let value = d.read_string()?;
        Ok(Self { data_type, value })
    }
}

/// Column definition: `string name, u8 type, u8 is_primary` on the wire.
///
/// The same struct doubles as the engine's column metadata, so it also
/// carries bincode derives for the persisted `.meta` artifact.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub is_primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType, is_primary_key: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            is_primary_key,
        }
    }

    pub fn encode(&self, s: &mut Serializer) -> Result<(), SerializationError> {
        s.write_string(&self.name)?;
        s.write_u8(self.data_type as u8);
        s.write_u8(self.is_primary_key as u8);
        Ok(())
    }

    pub fn decode(d: &mut Deserializer) -> Result<Self, SerializationError> {
        let name = d.read_string()?;
        let data_type =
            DataType::from_u8(d.read_u8()?).ok_or(SerializationError::InvalidFormat)?;
        let is_primary_key = d.read_u8()? != 0;
        Ok(Self {
            name,
            data_type,
            is_primary_key,
        })
    }
}

/// UPDATE assignment: `string column, LiteralValue value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetClause {
    pub column: String,
    pub value: LiteralValue,
}

impl SetClause {
    pub fn new(column: impl Into<String>, value: LiteralValue) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }

    pub fn encode(&self, s: &mut Serializer) -> Result<(), SerializationError> {
        s.write_string(&self.column)?;
        self.value.encode(s)
    }

    pub fn decode(d: &mut Deserializer) -> Result<Self, SerializationError> {
        let column = d.read_string()?;
        let value = LiteralValue::decode(d)?;
        Ok(Self { column, value })
    }
}

/// A single WHERE comparison: `string column, string operator, LiteralValue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhereCondition {
    pub column: String,
    pub operator: String,
    pub value: LiteralValue,
}

impl WhereCondition {
    pub fn new(column: impl Into<String>, operator: impl Into<String>, value: LiteralValue) -> Self {
        Self {
            column: column.into(),
            operator: operator.into(),
            value,
        }
    }

    pub fn encode(&self, s: &mut Serializer) -> Result<(), SerializationError> {
        s.write_string(&self.column)?;
        s.write_string(&self.operator)?;
        self.value.encode(s)
    }

    pub fn decode(d: &mut Deserializer) -> Result<Self, SerializationError> {
        let column = d.read_string()?;
        let operator = d.read_string()?;
        let value = LiteralValue::decode(d)?;
        Ok(Self {
            column,
            operator,
            value,
        })
    }

    /// Textual form consumed by the engine's condition evaluator. String
    /// literals are single-quoted so the evaluator strips them back out.
    pub fn to_expression(&self) -> String {
        match self.value.data_type {
            DataType::String => {
                format!("{} {} '{}'", self.column, self.operator, self.value.value)
            }
            _ => format!("{} {} {}", self.column, self.operator, self.value.value),
        }
    }
}

/// One statement, marshalled. Field groups unused by the operation are left
/// empty and still framed (as zero counts) on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub operation: Operation,
    pub session_token: String,
    pub database_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    pub select_columns: Vec<String>,
    pub insert_values: Vec<LiteralValue>,
    pub update_clauses: Vec<SetClause>,
    pub where_condition: Option<WhereCondition>,
}

impl QueryRequest {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            session_token: String::new(),
            database_name: String::new(),
            table_name: String::new(),
            columns: Vec::new(),
            select_columns: Vec::new(),
            insert_values: Vec::new(),
            update_clauses: Vec::new(),
            where_condition: None,
        }
    }

    /// Name of the object the operation targets, for permission checks.
    pub fn object_name(&self) -> &str {
        match self.operation {
            Operation::CreateDatabase | Operation::DropDatabase | Operation::UseDatabase => {
                &self.database_name
            }
            _ => &self.table_name,
        }
    }

    pub fn encode_payload(&self, s: &mut Serializer) -> Result<(), SerializationError> {
        s.write_u8(self.operation as u8);
        s.write_string(&self.session_token)?;
        s.write_string(&self.database_name)?;
        s.write_string(&self.table_name)?;

        s.write_u32(self.columns.len() as u32);
        for column in &self.columns {
            column.encode(s)?;
        }

        s.write_u32(self.select_columns.len() as u32);
        for name in &self.select_columns {
            s.write_string(name)?;
        }

        s.write_u32(self.insert_values.len() as u32);
        for value in &self.insert_values {
            value.encode(s)?;
        }

        s.write_u32(self.update_clauses.len() as u32);
        for clause in &self.update_clauses {
            clause.encode(s)?;
        }

        match &self.where_condition {
            Some(condition) => {
                s.write_u8(1);
                condition.encode(s)?;
            }
            None => s.write_u8(0),
        }
        Ok(())
    }

    pub fn decode_payload(d: &mut Deserializer) -> Result<Self, SerializationError> {
        let operation =
            Operation::from_u8(d.read_u8()?).ok_or(SerializationError::InvalidFormat)?;
        let session_token = d.read_string()?;
        let database_name = d.read_string()?;
        let table_name = d.read_string()?;

        let n_columns = d.read_u32()? as usize;
        let mut columns = Vec::with_capacity(n_columns.min(1024));
        for _ in 0..n_columns {
            columns.push(ColumnDef::decode(d)?);
        }

        let n_select = d.read_u32()? as usize;
        let mut select_columns = Vec::with_capacity(n_select.min(1024));
        for _ in 0..n_select {
            select_columns.push(d.read_string()?);
        }

        let n_insert = d.read_u32()? as usize;
        let mut insert_values = Vec::with_capacity(n_insert.min(1024));
        for _ in 0..n_insert {
            insert_values.push(LiteralValue::decode(d)?);
        }

        let n_update = d.read_u32()? as usize;
        let mut update_clauses = Vec::with_capacity(n_update.min(1024));
        for _ in 0..n_update {
            update_clauses.push(SetClause::decode(d)?);
        }

        let where_condition = match d.read_u8()? {
            0 => None,
            _ => Some(WhereCondition::decode(d)?),
        };

        Ok(Self {
            operation,
            session_token,
            database_name,
            table_name,
            columns,
            select_columns,
            insert_values,
            update_clauses,
            where_condition,
        })
    }
}

/// Result of one statement: a grid of string cells on success, a message on
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    pub success: bool,
    pub column_names: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub error_message: String,
}

impl QueryResponse {
    pub fn ok(column_names: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            success: true,
            column_names,
            rows,
            error_message: String::new(),
        }
    }

    /// Success with no result grid (DDL, INSERT, and friends).
    pub fn empty() -> Self {
        Self::ok(Vec::new(), Vec::new())
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            column_names: Vec::new(),
            rows: Vec::new(),
            error_message: message.into(),
        }
    }

    pub fn encode_payload(&self, s: &mut Serializer) -> Result<(), SerializationError> {
        s.write_u8(self.success as u8);
        if self.success {
            s.write_u32(self.column_names.len() as u32);
            for name in &self.column_names {
                s.write_string(name)?;
            }
            s.write_u32(self.rows.len() as u32);
            for row in &self.rows {
                s.write_u32(row.len() as u32);
                for cell in row {
                    s.write_string(cell)?;
                }
            }
        } else {
            s.write_string(&self.error_message)?;
        }
        Ok(())
    }

    pub fn decode_payload(d: &mut Deserializer) -> Result<Self, SerializationError> {
        let success = d.read_u8()? != 0;
        if !success {
            return Ok(Self::failure(d.read_string()?));
        }

        let n_columns = d.read_u32()? as usize;
        let mut column_names = Vec::with_capacity(n_columns.min(1024));
        for _ in 0..n_columns {
            column_names.push(d.read_string()?);
        }

        let n_rows = d.read_u32()? as usize;
        let mut rows = Vec::with_capacity(n_rows.min(1024));
        for _ in 0..n_rows {
            let n_cells = d.read_u32()? as usize;
            let mut row = Vec::with_capacity(n_cells.min(1024));
            for _ in 0..n_cells {
                row.push(d.read_string()?);
            }
            rows.push(row);
        }

        Ok(Self::ok(column_names, rows))
    }
}
