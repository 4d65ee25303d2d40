//! Generic driver for SQL source systems.
//!
//! [`SqlMigrationDriver`] implements [`MigrationDriver`] once for every SQL
//! engine. Engine differences (connecting, quoting, catalog queries, result
//! streaming) live behind the [`SqlDialect`] strategy.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{MigrationJobConfig, SourceConfig};
use crate::core::identifier::unique_name;
use crate::core::{
    copy_records, ColumnSchema, ColumnType, CopyContext, MigrationDriver, ProgressUnit, RawRecord,
    RecordCursor, RecordFilter, TableSchema, TableSink, TypeCache, TypeResolver,
};
use crate::error::{MigrateError, Result};
use crate::registry::DriverMetadata;

/// A result column as reported by the engine for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribedColumn {
    pub name: String,
    /// Engine type name, e.g. "int4" or "VARCHAR".
    pub type_name: String,
    pub nullable: Option<bool>,
}

/// Catalog facts about a column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnConstraints {
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub max_length: Option<u32>,
}

/// Turns an engine's text rendering of a blob field back into its bytes.
/// `None` leaves the field as read.
pub type BlobDecoder = fn(&[u8]) -> Option<Vec<u8>>;

/// SQL engine strategy used by [`SqlMigrationDriver`].
#[async_trait]
pub trait SqlDialect: Send + Sync {
    /// Engine name for log messages.
    fn name(&self) -> &str;

    /// Quote an identifier for this engine.
    fn quote_ident(&self, name: &str) -> Result<String>;

    /// Query returning one row per table, table name in the first column.
    fn list_tables_query(&self) -> String;

    fn select_all_query(&self, table: &str) -> Result<String> {
        Ok(format!("SELECT * FROM {}", self.quote_ident(table)?))
    }

    /// Query returning no rows but the full column list of `table`.
    fn select_schema_query(&self, table: &str) -> Result<String> {
        Ok(format!("SELECT * FROM {} LIMIT 0", self.quote_ident(table)?))
    }

    fn count_query(&self, table: &str) -> Result<String> {
        Ok(format!("SELECT COUNT(*) FROM {}", self.quote_ident(table)?))
    }

    /// Decoder for blob fields the engine streams in an encoded form.
    fn blob_decoder(&self) -> Option<BlobDecoder> {
        None
    }

    /// Map an engine type name to a destination type, `Unknown` if unsure.
    fn map_type(&self, type_name: &str) -> ColumnType;

    fn is_connected(&self) -> bool;

    async fn connect(&mut self, source: &SourceConfig) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    /// Result columns of `sql`, without running it to completion.
    async fn describe(&mut self, sql: &str) -> Result<Vec<DescribedColumn>>;

    /// Run `sql` and stream its rows in text form. `context` names the table
    /// for error messages.
    async fn open_cursor<'a>(
        &'a mut self,
        sql: &'a str,
        context: &str,
    ) -> Result<Box<dyn RecordCursor + 'a>>;

    /// Catalog constraints of `table`'s columns, keyed by lower-cased column
    /// name. Engines without catalog access return an empty map.
    async fn column_constraints(
        &mut self,
        _table: &str,
    ) -> Result<HashMap<String, ColumnConstraints>> {
        Ok(HashMap::new())
    }
}

/// Turn an error raised while reading catalog data into a schema error.
fn schema_error(e: MigrateError) -> MigrateError {
    match e {
        MigrateError::Copy {
            message,
            server_message,
            ..
        } => MigrateError::Schema {
            message,
            server_message,
        },
        other => other,
    }
}

/// Applies a [`BlobDecoder`] to the blob columns of each record.
struct BlobDecodingCursor<'a> {
    inner: Box<dyn RecordCursor + 'a>,
    columns: Vec<usize>,
    decode: BlobDecoder,
}

#[async_trait]
impl RecordCursor for BlobDecodingCursor<'_> {
    async fn next_record(&mut self) -> Result<Option<RawRecord>> {
        let Some(mut record) = self.inner.next_record().await? else {
            return Ok(None);
        };
        for &index in &self.columns {
            if let Some(decoded) = record.get(index).and_then(self.decode) {
                record.set(index, Some(decoded));
            }
        }
        Ok(Some(record))
    }
}

/// [`MigrationDriver`] for any engine with a [`SqlDialect`].
pub struct SqlMigrationDriver<D: SqlDialect> {
    dialect: D,
    metadata: Option<Arc<DriverMetadata>>,
    type_cache: TypeCache,
    /// Lower-cased table name to the spelling used by the source.
    table_names: HashMap<String, String>,
}

impl<D: SqlDialect + Default> Default for SqlMigrationDriver<D> {
    fn default() -> Self {
        Self::new(D::default())
    }
}

impl<D: SqlDialect> SqlMigrationDriver<D> {
    pub fn new(dialect: D) -> Self {
        Self {
            dialect,
            metadata: None,
            type_cache: TypeCache::new(),
            table_names: HashMap::new(),
        }
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    pub fn dialect_mut(&mut self) -> &mut D {
        &mut self.dialect
    }

    /// Source spelling of a name returned by `list_tables`.
    fn source_name(&self, name: &str) -> String {
        self.table_names
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

#[async_trait]
impl<D: SqlDialect> MigrationDriver for SqlMigrationDriver<D> {
    fn metadata(&self) -> Option<Arc<DriverMetadata>> {
        self.metadata.clone()
    }

    fn bind_metadata(&mut self, metadata: Arc<DriverMetadata>) {
        self.metadata = Some(metadata);
    }

    async fn connect(&mut self, job: &MigrationJobConfig) -> Result<()> {
        if self.dialect.is_connected() {
            return Ok(());
        }
        self.type_cache.clear();
        self.table_names.clear();
        self.dialect.connect(&job.source).await?;
        info!("Connected to {} source", self.dialect.name());
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if !self.dialect.is_connected() {
            return Ok(());
        }
        self.dialect.disconnect().await?;
        debug!("Disconnected from {} source", self.dialect.name());
        Ok(())
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let sql = self.dialect.list_tables_query();
        let described = self.dialect.describe(&sql).await.map_err(schema_error)?;
        if described.is_empty() {
            return Err(MigrateError::schema("table list query returned no columns"));
        }

        let mut originals = Vec::new();
        {
            let mut cursor = self
                .dialect
                .open_cursor(&sql, "table list")
                .await
                .map_err(schema_error)?;
            while let Some(record) = cursor.next_record().await.map_err(schema_error)? {
                if record.is_empty() {
                    return Err(MigrateError::schema(
                        "table list query returned no columns",
                    ));
                }
                match record.text(0) {
                    Some(name) if !name.is_empty() => originals.push(name.to_string()),
                    _ => warn!("Skipping table with unreadable name"),
                }
            }
        }

        self.table_names.clear();
        let mut names = Vec::with_capacity(originals.len());
        for original in originals {
            let lower = original.to_lowercase();
            let name = unique_name(&lower, |n| self.table_names.contains_key(n));
            if name != lower {
                warn!(
                    "Table {} differs from another only by case, importing it as {}",
                    original, name
                );
            }
            self.table_names.insert(name.clone(), original);
            names.push(name);
        }
        debug!("Found {} tables", names.len());
        Ok(names)
    }

    async fn read_table_schema(
        &mut self,
        name: &str,
        resolver: &dyn TypeResolver,
    ) -> Result<TableSchema> {
        let source_name = self.source_name(name);
        let sql = self.dialect.select_schema_query(&source_name)?;
        let described = self.dialect.describe(&sql).await.map_err(schema_error)?;
        if described.is_empty() {
            return Err(MigrateError::schema(format!(
                "table \"{}\" has no columns",
                source_name
            )));
        }

        let constraints = match self.dialect.column_constraints(&source_name).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Could not read constraints of {}: {}", source_name, e);
                HashMap::new()
            }
        };

        let mut table = TableSchema::new(name.to_lowercase());
        table.caption = source_name.clone();
        for col in described {
            let mut column_type = self.dialect.map_type(&col.type_name);
            if !column_type.is_known() {
                column_type = self.type_cache.resolve(&table.name, &col.name, resolver)?;
            }

            let mut column =
                ColumnSchema::new(col.name.clone(), column_type).with_source_type(&col.type_name);
            if let Some(nullable) = col.nullable {
                column.nullable = nullable;
            }
            if let Some(c) = constraints.get(&col.name.to_lowercase()) {
                column.nullable = c.nullable;
                column.primary_key = c.primary_key;
                column.auto_increment = c.auto_increment;
                column.max_length = c.max_length;
            }
            table.add_column(column)?;
        }

        debug!("Loaded {} columns for {}", table.column_count(), source_name);
        Ok(table)
    }

    async fn table_size(&mut self, name: &str) -> Result<Option<u64>> {
        let source_name = self.source_name(name);
        let sql = self.dialect.count_query(&source_name)?;
        let mut cursor = self
            .dialect
            .open_cursor(&sql, &source_name)
            .await
            .map_err(schema_error)?;
        let record = cursor.next_record().await.map_err(schema_error)?;
        Ok(record
            .as_ref()
            .and_then(|r| r.text(0))
            .and_then(|s| s.trim().parse::<u64>().ok()))
    }

    async fn copy_table(
        &mut self,
        source_name: &str,
        dest: &TableSchema,
        sink: &mut dyn TableSink,
        filter: Option<&dyn RecordFilter>,
        ctx: &mut CopyContext<'_>,
    ) -> Result<u64> {
        let real_name = self.source_name(source_name);
        let sql = self.dialect.select_all_query(&real_name)?;
        let decoder = self.dialect.blob_decoder();
        let mut cursor = self.dialect.open_cursor(&sql, &real_name).await?;
        if let Some(decode) = decoder {
            let columns: Vec<usize> = dest
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.column_type == ColumnType::Blob)
                .map(|(i, _)| i)
                .collect();
            if !columns.is_empty() {
                cursor = Box::new(BlobDecodingCursor {
                    inner: cursor,
                    columns,
                    decode,
                });
            }
        }
        copy_records(
            cursor.as_mut(),
            &real_name,
            dest,
            sink,
            filter,
            ctx,
            ProgressUnit::Rows,
        )
        .await
    }

    fn supports_progress(&self) -> bool {
        true
    }
}
