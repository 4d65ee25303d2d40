//! Streaming row copy shared by all drivers.
//!
//! Drivers open a [`RecordCursor`] over the source table and hand it to
//! [`copy_records`], which owns the per-row sequence: filter, convert,
//! insert, report progress, check for cancellation. Only one record is alive
//! at a time.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::progress::ProgressEstimator;

use super::schema::{ColumnType, TableSchema};
use super::traits::{RecordFilter, TableSink};
use super::value::RawRecord;

/// Forward-only iterator over the raw records of a result set.
#[async_trait]
pub trait RecordCursor: Send {
    /// Fetch the next record, or `None` at the end of the result set.
    async fn next_record(&mut self) -> Result<Option<RawRecord>>;
}

/// Per-job state threaded through `copy_table`.
pub struct CopyContext<'a> {
    pub progress: &'a mut ProgressEstimator,
    pub cancel: CancellationToken,
}

impl<'a> CopyContext<'a> {
    pub fn new(progress: &'a mut ProgressEstimator, cancel: CancellationToken) -> Self {
        Self { progress, cancel }
    }
}

/// How many progress units a fetched record is worth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUnit {
    /// One unit per row.
    Rows,
    /// The record's byte length, plus one for its terminator.
    Bytes,
    /// No per-row progress.
    None,
}

impl ProgressUnit {
    fn units(&self, record: &RawRecord) -> u64 {
        match self {
            ProgressUnit::Rows => 1,
            ProgressUnit::Bytes => record.byte_len() as u64 + record.len() as u64,
            ProgressUnit::None => 0,
        }
    }
}

/// Copy every record from `cursor` into `sink` as rows of `dest`.
///
/// Records are converted using `dest`'s column types; extra source fields are
/// ignored and missing ones become NULL. Rows rejected by `filter` are not
/// inserted but still count toward progress. Returns the number of rows
/// inserted; the first error stops the copy.
pub async fn copy_records(
    cursor: &mut dyn RecordCursor,
    source_name: &str,
    dest: &TableSchema,
    sink: &mut dyn TableSink,
    filter: Option<&dyn RecordFilter>,
    ctx: &mut CopyContext<'_>,
    unit: ProgressUnit,
) -> Result<u64> {
    let types: Vec<ColumnType> = dest.column_types();
    let mut inserted = 0u64;
    let mut fetched = 0u64;

    while let Some(record) = cursor.next_record().await? {
        fetched += 1;
        let raw_verdict = filter.and_then(|f| f.filter_raw(&record));

        if raw_verdict != Some(false) {
            let values = record.to_values(&types);
            let keep = match (raw_verdict, filter) {
                (None, Some(f)) => f.filter_values(&values),
                _ => true,
            };
            if keep {
                sink.insert_row(dest, values).await.map_err(|e| {
                    MigrateError::copy_with(
                        source_name,
                        format!("could not insert row {}: {}", fetched, e.message),
                        e.server_message,
                    )
                })?;
                inserted += 1;
            }
        }

        ctx.progress.advance(unit.units(&record));
        drop(record);

        if ctx.cancel.is_cancelled() {
            debug!("Copy of {} cancelled after {} rows", source_name, fetched);
            return Err(MigrateError::Cancelled);
        }
    }

    debug!(
        "Copied {} of {} rows from {} into {}",
        inserted, fetched, source_name, dest.name
    );
    Ok(inserted)
}
