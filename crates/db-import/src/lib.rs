//! # db-import
//!
//! Database import engine.
//!
//! This library imports tables from heterogeneous sources into a destination
//! with support for:
//!
//! - **Pluggable drivers** discovered through a versioned [`DriverRegistry`]
//! - **SQL sources** (PostgreSQL, MySQL/MariaDB) through one generic driver
//!   parameterized by a dialect
//! - **File sources** such as tab-separated text
//! - **Streaming copy**: one row in memory at a time, with cancellation
//! - **Progress estimation** weighted by table size
//! - **Caller-driven type resolution** for columns the driver cannot type
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use db_import::{
//!     Config, DriverRegistry, ImportOptions, MigrateError, MigrationOrchestrator, PostgresSink,
//! };
//!
//! #[tokio::main]
//! async fn main() -> db_import::Result<()> {
//!     let config = Config::load("import.yaml")?;
//!     let destination = config
//!         .destination
//!         .clone()
//!         .ok_or_else(|| MigrateError::Config("destination is required".into()))?;
//!     let mut sink = PostgresSink::connect(&destination).await?;
//!
//!     let mut orchestrator = MigrationOrchestrator::new(Arc::new(DriverRegistry::with_builtins()));
//!     let report = orchestrator
//!         .perform_import(&config, &mut sink, &ImportOptions::default())
//!         .await?;
//!     println!("Imported {} rows", report.rows_copied);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod registry;

// Re-exports for convenient access
pub use config::{Config, DestinationConfig, MigrationJobConfig, SourceConfig, SslMode};
pub use crate::core::{
    ColumnSchema, ColumnType, FixedTypeResolver, MigrationDriver, RawRecord, RecordFilter,
    RejectUnknownTypes, SinkError, TableSchema, TableSink, TypeResolver, Value,
};
pub use drivers::{PostgresSink, SqlMigrationDriver, TsvMigrationDriver};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    IdentifierTranslator, ImportOptions, ImportReport, ImportState, MigrationOrchestrator,
    SchemaTranslator, TableReport,
};
pub use progress::{ProgressEstimator, ProgressObserver, ProgressState, DEFAULT_TABLE_WEIGHT};
pub use registry::{BuiltinPlugins, DriverMetadata, DriverPlugin, DriverRegistry, PluginLoader};
