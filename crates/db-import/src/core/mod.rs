//! Core abstractions for source-agnostic importing.
//!
//! - [`schema`]: table and column metadata, the destination column type set
//! - [`value`]: raw records and converted values
//! - [`traits`]: the driver, sink and filter contracts
//! - [`resolve`]: caller-driven resolution of untypeable columns
//! - [`copy`]: the streaming per-row copy loop
//! - [`identifier`]: identifier quoting and normalization

pub mod copy;
pub mod identifier;
pub mod resolve;
pub mod schema;
pub mod traits;
pub mod value;

pub use copy::{copy_records, CopyContext, ProgressUnit, RecordCursor};
pub use resolve::{FixedTypeResolver, RejectUnknownTypes, TypeCache, TypeResolver};
pub use schema::{ColumnSchema, ColumnType, TableSchema};
pub use traits::{MigrationDriver, RecordFilter, SinkError, TableSink};
pub use value::{RawRecord, Value};
