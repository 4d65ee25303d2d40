//! Table and column metadata shared by every driver.
//!
//! These types describe a table both as it exists in the source and, after
//! translation, as it will be created in the destination.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MigrateError, Result};

/// Destination field type of a column.
///
/// `Unknown` is only valid before type resolution; a schema handed to a sink
/// never contains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Byte,
    ShortInteger,
    Integer,
    BigInteger,
    Boolean,
    Date,
    DateTime,
    Time,
    Float,
    Double,
    Text,
    LongText,
    Blob,
    Unknown,
}

impl ColumnType {
    /// All concrete (non-`Unknown`) types, in the order they are offered to users.
    pub const CONCRETE: [ColumnType; 13] = [
        ColumnType::Byte,
        ColumnType::ShortInteger,
        ColumnType::Integer,
        ColumnType::BigInteger,
        ColumnType::Boolean,
        ColumnType::Date,
        ColumnType::DateTime,
        ColumnType::Time,
        ColumnType::Float,
        ColumnType::Double,
        ColumnType::Text,
        ColumnType::LongText,
        ColumnType::Blob,
    ];

    /// Short lower-case name, as used in job files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Byte => "byte",
            ColumnType::ShortInteger => "short_integer",
            ColumnType::Integer => "integer",
            ColumnType::BigInteger => "big_integer",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "date_time",
            ColumnType::Time => "time",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::Text => "text",
            ColumnType::LongText => "long_text",
            ColumnType::Blob => "blob",
            ColumnType::Unknown => "unknown",
        }
    }

    /// Parse a type name. Accepts the `as_str` spelling and a few common aliases.
    pub fn parse(name: &str) -> Option<ColumnType> {
        let normalized = name.trim().to_lowercase().replace('-', "_");
        let ty = match normalized.as_str() {
            "byte" | "tinyint" => ColumnType::Byte,
            "short_integer" | "smallint" => ColumnType::ShortInteger,
            "integer" | "int" => ColumnType::Integer,
            "big_integer" | "bigint" => ColumnType::BigInteger,
            "boolean" | "bool" => ColumnType::Boolean,
            "date" => ColumnType::Date,
            "date_time" | "datetime" | "timestamp" => ColumnType::DateTime,
            "time" => ColumnType::Time,
            "float" | "real" => ColumnType::Float,
            "double" => ColumnType::Double,
            "text" => ColumnType::Text,
            "long_text" | "longtext" => ColumnType::LongText,
            "blob" | "bytes" => ColumnType::Blob,
            _ => return None,
        };
        Some(ty)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::Byte
                | ColumnType::ShortInteger
                | ColumnType::Integer
                | ColumnType::BigInteger
        )
    }

    pub fn is_known(&self) -> bool {
        *self != ColumnType::Unknown
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,

    /// Destination field type.
    pub column_type: ColumnType,

    /// Whether the column accepts NULL.
    pub nullable: bool,

    /// Whether the column is part of the primary key.
    pub primary_key: bool,

    /// Whether the source generates values for this column.
    pub auto_increment: bool,

    /// Maximum length for character types, when the source reports one.
    pub max_length: Option<u32>,

    /// Type name as reported by the source, kept for diagnostics.
    pub source_type: String,
}

impl ColumnSchema {
    /// Create a nullable, non-key column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            primary_key: false,
            auto_increment: false,
            max_length: None,
            source_type: String::new(),
        }
    }

    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = source_type.into();
        self
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,

    /// Original name as it appears in the source.
    pub caption: String,

    /// Column definitions, in source order.
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Create an empty table whose caption equals its name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            caption: name.clone(),
            name,
            columns: Vec::new(),
        }
    }

    /// Append a column.
    ///
    /// Column names are unique within a table, compared case-insensitively.
    pub fn add_column(&mut self, column: ColumnSchema) -> Result<()> {
        if self.column(&column.name).is_some() {
            return Err(MigrateError::schema(format!(
                "Duplicate column \"{}\" in table \"{}\"",
                column.name, self.name
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Look up a column by name, case-insensitively.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Names of the primary key columns, in column order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Destination types in column order.
    pub fn column_types(&self) -> Vec<ColumnType> {
        self.columns.iter().map(|c| c.column_type).collect()
    }

    /// Qualified `table.column` name used when asking for a column's type.
    pub fn qualified_column_name(&self, column: &str) -> String {
        format!("{}.{}", self.name, column)
    }
}
