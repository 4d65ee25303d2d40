//! In-memory SQL dialect for driver, registry and orchestrator tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::postgres::decode_bytea_hex;
use super::sql::{BlobDecoder, ColumnConstraints, DescribedColumn, SqlDialect, SqlMigrationDriver};
use crate::config::SourceConfig;
use crate::core::copy::testing::VecCursor;
use crate::core::{ColumnType, RecordCursor};
use crate::error::{MigrateError, Result};

pub type FakeDriver = SqlMigrationDriver<FakeDialect>;

const LIST_QUERY: &str = "LIST TABLES";

/// A table served by [`FakeDialect`].
#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    pub name: String,
    pub columns: Vec<(String, String)>,
    pub rows: Vec<Vec<Option<String>>>,
    /// Text returned by the count query; the row count when `None`.
    pub count: Option<String>,
    pub constraints: HashMap<String, ColumnConstraints>,
}

impl FakeTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn column(mut self, name: &str, type_name: &str) -> Self {
        self.columns.push((name.to_string(), type_name.to_string()));
        self
    }

    pub fn row(mut self, fields: Vec<Option<&str>>) -> Self {
        self.rows
            .push(fields.into_iter().map(|f| f.map(str::to_string)).collect());
        self
    }

    pub fn with_count(mut self, count: &str) -> Self {
        self.count = Some(count.to_string());
        self
    }

    pub fn with_constraint(mut self, column: &str, primary_key: bool, nullable: bool) -> Self {
        self.constraints.insert(
            column.to_lowercase(),
            ColumnConstraints {
                nullable,
                primary_key,
                auto_increment: false,
                max_length: None,
            },
        );
        self
    }
}

/// Dialect answering queries from in-memory tables.
///
/// Identifiers are quoted with brackets so queries can be mapped back to the
/// table they address.
#[derive(Debug, Default)]
pub struct FakeDialect {
    pub tables: Vec<FakeTable>,
    pub connected: bool,
    pub fail_connect: bool,
    pub list_without_columns: bool,
    /// Stream blob fields in PostgreSQL hex form.
    pub hex_blobs: bool,
    pub connects: Arc<AtomicUsize>,
    pub disconnects: Arc<AtomicUsize>,
}

impl FakeDialect {
    pub fn with_tables(tables: Vec<FakeTable>) -> Self {
        Self {
            tables,
            ..Self::default()
        }
    }

    fn table_in(&self, sql: &str) -> Result<&FakeTable> {
        let name = sql
            .split_once('[')
            .and_then(|(_, rest)| rest.split_once(']'))
            .map(|(name, _)| name)
            .unwrap_or_default();
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| MigrateError::schema_with(format!("no table in {}", sql), "relation does not exist"))
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(MigrateError::connection("not connected"))
        }
    }
}

#[async_trait]
impl SqlDialect for FakeDialect {
    fn name(&self) -> &str {
        "fake"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        Ok(format!("[{}]", name))
    }

    fn list_tables_query(&self) -> String {
        LIST_QUERY.to_string()
    }

    fn blob_decoder(&self) -> Option<BlobDecoder> {
        self.hex_blobs.then_some(decode_bytea_hex as BlobDecoder)
    }

    fn map_type(&self, type_name: &str) -> ColumnType {
        match type_name {
            "int" => ColumnType::Integer,
            "varchar" => ColumnType::Text,
            "double" => ColumnType::Double,
            "blob" => ColumnType::Blob,
            _ => ColumnType::Unknown,
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self, _source: &SourceConfig) -> Result<()> {
        if self.fail_connect {
            return Err(MigrateError::connection_with(
                "could not connect to fake source",
                "connection refused",
            ));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
        Ok(())
    }

    async fn describe(&mut self, sql: &str) -> Result<Vec<DescribedColumn>> {
        self.ensure_connected()?;
        if sql == LIST_QUERY {
            if self.list_without_columns {
                return Ok(Vec::new());
            }
            return Ok(vec![DescribedColumn {
                name: "table_name".to_string(),
                type_name: "varchar".to_string(),
                nullable: Some(false),
            }]);
        }
        let table = self.table_in(sql)?;
        Ok(table
            .columns
            .iter()
            .map(|(name, type_name)| DescribedColumn {
                name: name.clone(),
                type_name: type_name.clone(),
                nullable: None,
            })
            .collect())
    }

    async fn open_cursor<'a>(
        &'a mut self,
        sql: &'a str,
        _context: &str,
    ) -> Result<Box<dyn RecordCursor + 'a>> {
        self.ensure_connected()?;
        let rows: Vec<Vec<Option<String>>> = if sql == LIST_QUERY {
            self.tables
                .iter()
                .map(|t| {
                    if self.list_without_columns {
                        Vec::new()
                    } else {
                        vec![Some(t.name.clone())]
                    }
                })
                .collect()
        } else if sql.starts_with("SELECT COUNT(*)") {
            let table = self.table_in(sql)?;
            let count = table
                .count
                .clone()
                .unwrap_or_else(|| table.rows.len().to_string());
            vec![vec![Some(count)]]
        } else {
            self.table_in(sql)?.rows.clone()
        };

        let rows: Vec<Vec<Option<&str>>> = rows
            .iter()
            .map(|r| r.iter().map(|f| f.as_deref()).collect())
            .collect();
        Ok(Box::new(VecCursor::new(rows)))
    }

    async fn column_constraints(
        &mut self,
        table: &str,
    ) -> Result<HashMap<String, ColumnConstraints>> {
        Ok(self
            .tables
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.constraints.clone())
            .unwrap_or_default())
    }
}
