//! Core traits for importing from heterogeneous sources.
//!
//! - [`MigrationDriver`]: reads tables and rows from one family of source systems
//! - [`TableSink`]: receives translated tables and converted rows
//! - [`RecordFilter`]: optional per-row predicate applied while copying
//!
//! # Design Patterns
//!
//! - **Strategy**: SQL drivers share one implementation and differ only by
//!   their [`SqlDialect`](crate::drivers::sql::SqlDialect)
//! - **Template Method**: the per-row copy loop lives in [`core::copy`](super::copy)
//!   and drivers only supply a cursor

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::MigrationJobConfig;
use crate::error::Result;
use crate::registry::DriverMetadata;

use super::copy::CopyContext;
use super::resolve::TypeResolver;
use super::schema::TableSchema;
use super::value::{RawRecord, Value};

/// A source-system family the engine can import from.
///
/// One instance serves one job at a time; the registry hands it out behind
/// an async mutex that the orchestrator holds for the whole job.
#[async_trait]
pub trait MigrationDriver: Send {
    /// Metadata bound by the registry, if any.
    fn metadata(&self) -> Option<Arc<DriverMetadata>>;

    /// Attach registry metadata. Called once after instantiation.
    fn bind_metadata(&mut self, metadata: Arc<DriverMetadata>);

    /// Open the source described by `job.source`.
    ///
    /// A no-op if already connected. Connecting starts a new job, so any
    /// cached type-resolution answers are discarded.
    async fn connect(&mut self, job: &MigrationJobConfig) -> Result<()>;

    /// Close the source. Safe to call when not connected.
    async fn disconnect(&mut self) -> Result<()>;

    /// Lower-case names of all importable tables, possibly empty.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Read a table's columns, asking `resolver` for any column whose type
    /// cannot be determined.
    async fn read_table_schema(
        &mut self,
        name: &str,
        resolver: &dyn TypeResolver,
    ) -> Result<TableSchema>;

    /// Cheap size estimate in driver-defined units, or `None`.
    async fn table_size(&mut self, name: &str) -> Result<Option<u64>>;

    /// Stream every row of `source_name` into `sink` as rows of `dest`.
    ///
    /// Returns the number of rows inserted.
    async fn copy_table(
        &mut self,
        source_name: &str,
        dest: &TableSchema,
        sink: &mut dyn TableSink,
        filter: Option<&dyn RecordFilter>,
        ctx: &mut CopyContext<'_>,
    ) -> Result<u64>;

    /// Whether `copy_table` reports per-row progress.
    fn supports_progress(&self) -> bool;

    /// Driver id for log messages.
    fn driver_id(&self) -> String {
        self.metadata()
            .map(|m| m.id.clone())
            .unwrap_or_else(|| "unbound".to_string())
    }

    /// Driver property `name`. Defaults to the bound metadata's properties;
    /// drivers that learn properties from the source override this.
    fn property(&self, name: &str) -> Option<String> {
        self.metadata()
            .and_then(|m| m.property(name).map(str::to_string))
    }
}

/// Destination-side failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError {
    pub message: String,
    pub server_message: Option<String>,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            server_message: None,
        }
    }

    pub fn with_server_message(mut self, server_message: impl Into<String>) -> Self {
        self.server_message = Some(server_message.into());
        self
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SinkError {}

/// Destination of an import.
#[async_trait]
pub trait TableSink: Send {
    /// Create the destination table.
    async fn create_table(&mut self, schema: &TableSchema) -> std::result::Result<(), SinkError>;

    /// Insert one row. `values` follow the column order of `schema`.
    async fn insert_row(
        &mut self,
        schema: &TableSchema,
        values: Vec<Value>,
    ) -> std::result::Result<(), SinkError>;
}

/// Per-row predicate applied during copy.
pub trait RecordFilter: Send + Sync {
    /// Decide on the raw record. `None` means raw filtering is unsupported and
    /// [`filter_values`](Self::filter_values) is used after conversion.
    fn filter_raw(&self, record: &RawRecord) -> Option<bool>;

    /// Decide on the converted values.
    fn filter_values(&self, values: &[Value]) -> bool;
}
