//! Tab-separated text files as a source.
//!
//! The source path is either a single file (one table) or a directory whose
//! `.tsv`, `.tab` and `.txt` files each become a table named after the file
//! stem. The first line of a file holds the column names. Every column is
//! imported as text. Sizes and progress are measured in bytes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::config::MigrationJobConfig;
use crate::core::identifier::unique_name;
use crate::core::{
    copy_records, ColumnSchema, ColumnType, CopyContext, MigrationDriver, ProgressUnit,
    RawRecord, RecordCursor, RecordFilter, TableSchema, TableSink, TypeResolver,
};
use crate::error::{MigrateError, Result};
use crate::registry::DriverMetadata;

const TABLE_EXTENSIONS: [&str; 3] = ["tsv", "tab", "txt"];

/// Text encoding of the source files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Latin1,
}

impl TextEncoding {
    /// Parse an encoding name; anything that is not latin1 is read as UTF-8.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::to_lowercase).as_deref() {
            Some("latin1" | "latin-1" | "iso-8859-1") => TextEncoding::Latin1,
            _ => TextEncoding::Utf8,
        }
    }

    fn decode(self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

/// Strip the line terminator from a line read with `read_until`.
fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Split a line into fields. Empty fields are NULL.
fn split_fields(line: &str) -> RawRecord {
    RawRecord::new(
        line.split('\t')
            .map(|f| (!f.is_empty()).then(|| f.as_bytes().to_vec()))
            .collect(),
    )
}

/// Driver reading tab-separated files.
#[derive(Default)]
pub struct TsvMigrationDriver {
    metadata: Option<Arc<DriverMetadata>>,
    root: Option<PathBuf>,
    /// Table name to file. Names are lower-cased stems, suffixed when two
    /// stems differ only by case.
    files: BTreeMap<String, PathBuf>,
    encoding: TextEncoding,
}

impl TsvMigrationDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn file_for(&self, name: &str) -> Result<&Path> {
        if self.root.is_none() {
            return Err(MigrateError::connection("no TSV source is open"));
        }
        self.files
            .get(&name.to_lowercase())
            .map(PathBuf::as_path)
            .ok_or_else(|| MigrateError::schema(format!("no such table \"{}\"", name)))
    }

    async fn open(&self, name: &str) -> Result<(BufReader<File>, PathBuf)> {
        let path = self.file_for(name)?.to_path_buf();
        let file = File::open(&path).await.map_err(|e| {
            MigrateError::schema_with(format!("could not open {}", path.display()), e)
        })?;
        Ok((BufReader::new(file), path))
    }

    async fn scan(path: &Path) -> Result<BTreeMap<String, PathBuf>> {
        let mut files = BTreeMap::new();
        let meta = tokio::fs::metadata(path).await.map_err(|e| {
            MigrateError::connection_with(format!("source {} does not exist", path.display()), e)
        })?;

        if meta.is_file() {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                files.insert(stem.to_lowercase(), path.to_path_buf());
            }
            return Ok(files);
        }

        let mut tables = Vec::new();
        let mut entries = tokio::fs::read_dir(path).await.map_err(|e| {
            MigrateError::connection_with(format!("could not read {}", path.display()), e)
        })?;
        while let Some(entry) = entries.next_entry().await? {
            let file = entry.path();
            let is_table = file
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| TABLE_EXTENSIONS.contains(&e.to_lowercase().as_str()));
            if !is_table || !entry.file_type().await?.is_file() {
                continue;
            }
            tables.push(file);
        }

        tables.sort();
        for file in tables {
            let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let lower = stem.to_lowercase();
            let name = unique_name(&lower, |n| files.contains_key(n));
            if name != lower {
                warn!("Importing {} as table {}", file.display(), name);
            }
            files.insert(name, file);
        }
        Ok(files)
    }
}

/// Reads the header line. Returns its length in bytes including the
/// terminator, and the decoded column names.
async fn read_header(
    reader: &mut BufReader<File>,
    encoding: TextEncoding,
    path: &Path,
) -> Result<(u64, Vec<String>)> {
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Err(MigrateError::schema(format!(
            "{} has no header line",
            path.display()
        )));
    }
    let header = encoding.decode(trim_line(&line));
    let names = header
        .split('\t')
        .enumerate()
        .map(|(i, name)| {
            let name = name.trim();
            if name.is_empty() {
                format!("column_{}", i + 1)
            } else {
                name.to_string()
            }
        })
        .collect();
    Ok((n as u64, names))
}

#[async_trait]
impl MigrationDriver for TsvMigrationDriver {
    fn metadata(&self) -> Option<Arc<DriverMetadata>> {
        self.metadata.clone()
    }

    fn bind_metadata(&mut self, metadata: Arc<DriverMetadata>) {
        self.metadata = Some(metadata);
    }

    async fn connect(&mut self, job: &MigrationJobConfig) -> Result<()> {
        if self.root.is_some() {
            return Ok(());
        }
        let path = job
            .source
            .path
            .clone()
            .ok_or_else(|| MigrateError::connection("TSV source requires source.path"))?;
        self.files = Self::scan(&path).await?;
        self.encoding = TextEncoding::from_name(job.source.encoding.as_deref());
        info!(
            "Opened TSV source {} ({} files)",
            path.display(),
            self.files.len()
        );
        self.root = Some(path);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.root = None;
        self.files.clear();
        Ok(())
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        if self.root.is_none() {
            return Err(MigrateError::connection("no TSV source is open"));
        }
        Ok(self.files.keys().cloned().collect())
    }

    async fn read_table_schema(
        &mut self,
        name: &str,
        _resolver: &dyn TypeResolver,
    ) -> Result<TableSchema> {
        let (mut reader, path) = self.open(name).await?;
        let (_, names) = read_header(&mut reader, self.encoding, &path).await?;

        let mut table = TableSchema::new(name.to_lowercase());
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            table.caption = stem.to_string();
        }
        for column in names {
            table.add_column(ColumnSchema::new(column, ColumnType::Text).with_source_type("text"))?;
        }
        debug!("Read {} columns from {}", table.column_count(), path.display());
        Ok(table)
    }

    async fn table_size(&mut self, name: &str) -> Result<Option<u64>> {
        let (mut reader, path) = self.open(name).await?;
        let len = tokio::fs::metadata(&path).await?.len();
        let (header, _) = read_header(&mut reader, self.encoding, &path).await?;
        Ok(Some(len.saturating_sub(header)))
    }

    async fn copy_table(
        &mut self,
        source_name: &str,
        dest: &TableSchema,
        sink: &mut dyn TableSink,
        filter: Option<&dyn RecordFilter>,
        ctx: &mut CopyContext<'_>,
    ) -> Result<u64> {
        let path = self.file_for(source_name)?.to_path_buf();
        let file = File::open(&path).await.map_err(|e| {
            MigrateError::copy_with(
                source_name,
                format!("could not open {}", path.display()),
                Some(e.to_string()),
            )
        })?;
        let mut reader = BufReader::new(file);
        read_header(&mut reader, self.encoding, &path).await?;

        let mut cursor = TsvCursor {
            reader,
            encoding: self.encoding,
            line: Vec::new(),
            context: source_name.to_string(),
        };
        copy_records(
            &mut cursor,
            source_name,
            dest,
            sink,
            filter,
            ctx,
            ProgressUnit::Bytes,
        )
        .await
    }

    fn supports_progress(&self) -> bool {
        true
    }
}

/// Data lines of one file. Blank lines are skipped.
struct TsvCursor {
    reader: BufReader<File>,
    encoding: TextEncoding,
    line: Vec<u8>,
    context: String,
}

#[async_trait]
impl RecordCursor for TsvCursor {
    async fn next_record(&mut self) -> Result<Option<RawRecord>> {
        loop {
            self.line.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut self.line)
                .await
                .map_err(|e| MigrateError::copy_with(&self.context, "could not read line", Some(e.to_string())))?;
            if n == 0 {
                return Ok(None);
            }
            let line = trim_line(&self.line);
            if line.is_empty() {
                continue;
            }
            return Ok(Some(split_fields(&self.encoding.decode(line))));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::config::SourceConfig;
    use crate::core::copy::testing::MemorySink;
    use crate::core::{RejectUnknownTypes, Value};
    use crate::progress::ProgressEstimator;

    fn write(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    fn job(path: &Path) -> MigrationJobConfig {
        MigrationJobConfig::new(SourceConfig::file(path))
    }

    #[tokio::test]
    async fn test_directory_lists_table_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Customers.tsv", b"id\tname\n");
        write(dir.path(), "orders.tab", b"id\n");
        write(dir.path(), "notes.md", b"ignored\n");

        let mut driver = TsvMigrationDriver::new();
        driver.connect(&job(dir.path())).await.unwrap();
        assert_eq!(driver.list_tables().await.unwrap(), vec!["customers", "orders"]);

        let schema = driver
            .read_table_schema("customers", &RejectUnknownTypes)
            .await
            .unwrap();
        assert_eq!(schema.caption, "Customers");
        assert_eq!(schema.column_count(), 2);
        assert!(schema
            .columns
            .iter()
            .all(|c| c.column_type == ColumnType::Text));
    }

    #[tokio::test]
    async fn test_missing_path_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = TsvMigrationDriver::new();
        let err = driver
            .connect(&job(&dir.path().join("absent.tsv")))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Connection { .. }));

        let err = driver.list_tables().await.unwrap_err();
        assert!(matches!(err, MigrateError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_empty_file_has_no_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "empty.tsv", b"");
        let mut driver = TsvMigrationDriver::new();
        driver.connect(&job(&path)).await.unwrap();
        let err = driver
            .read_table_schema("empty", &RejectUnknownTypes)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Schema { .. }));
    }

    #[tokio::test]
    async fn test_copy_reports_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "people.tsv",
            b"id\tname\r\n1\tAda\r\n\r\n2\t\r\n3\tGrace\r\n",
        );
        let mut driver = TsvMigrationDriver::new();
        driver.connect(&job(&path)).await.unwrap();

        let size = driver.table_size("people").await.unwrap();
        assert_eq!(size, Some(22));

        let schema = driver
            .read_table_schema("people", &RejectUnknownTypes)
            .await
            .unwrap();
        let mut progress = ProgressEstimator::new();
        progress.initialize_with_sizes(vec![("people".to_string(), size)]);
        let mut sink = MemorySink::default();
        let mut ctx = CopyContext::new(&mut progress, CancellationToken::new());
        let copied = driver
            .copy_table("people", &schema, &mut sink, None, &mut ctx)
            .await
            .unwrap();

        assert_eq!(copied, 3);
        let rows = sink.rows_for("people");
        assert_eq!(rows[0], &vec![Value::Text("1".into()), Value::Text("Ada".into())]);
        assert_eq!(rows[1], &vec![Value::Text("2".into()), Value::Null]);
        assert!(progress.state().done > 0);
        assert!(progress.state().done <= progress.state().total);
    }

    #[tokio::test]
    async fn test_latin1_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "cities.tsv", b"name\nK\xf6ln\n");
        let mut job = job(&path);
        job.source.encoding = Some("latin1".to_string());

        let mut driver = TsvMigrationDriver::new();
        driver.connect(&job).await.unwrap();
        let schema = driver
            .read_table_schema("cities", &RejectUnknownTypes)
            .await
            .unwrap();
        let mut progress = ProgressEstimator::new();
        let mut sink = MemorySink::default();
        let mut ctx = CopyContext::new(&mut progress, CancellationToken::new());
        driver
            .copy_table("cities", &schema, &mut sink, None, &mut ctx)
            .await
            .unwrap();
        assert_eq!(sink.rows_for("cities")[0], &vec![Value::Text("Köln".into())]);
    }

    #[tokio::test]
    async fn test_stems_differing_by_case_stay_distinct() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Sales.tsv", b"id\n1\n");
        write(dir.path(), "sales.tab", b"id\n2\n");

        let mut driver = TsvMigrationDriver::new();
        driver.connect(&job(dir.path())).await.unwrap();
        assert_eq!(driver.list_tables().await.unwrap(), vec!["sales", "sales_2"]);

        for (table, expected) in [("sales", "1"), ("sales_2", "2")] {
            let schema = driver
                .read_table_schema(table, &RejectUnknownTypes)
                .await
                .unwrap();
            let mut progress = ProgressEstimator::new();
            let mut sink = MemorySink::default();
            let mut ctx = CopyContext::new(&mut progress, CancellationToken::new());
            driver
                .copy_table(table, &schema, &mut sink, None, &mut ctx)
                .await
                .unwrap();
            assert_eq!(sink.rows_for(table), vec![&vec![Value::Text(expected.into())]]);
        }
    }

    #[tokio::test]
    async fn test_file_gone_before_copy_is_copy_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "people.tsv", b"id\n1\n");
        let mut driver = TsvMigrationDriver::new();
        driver.connect(&job(&path)).await.unwrap();
        let schema = driver
            .read_table_schema("people", &RejectUnknownTypes)
            .await
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        let mut progress = ProgressEstimator::new();
        let mut sink = MemorySink::default();
        let mut ctx = CopyContext::new(&mut progress, CancellationToken::new());
        let err = driver
            .copy_table("people", &schema, &mut sink, None, &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Copy { .. }));
        assert!(err.server_message().is_some());
    }

    #[test]
    fn test_split_fields() {
        let record = split_fields("a\t\tc");
        assert_eq!(record.len(), 3);
        assert_eq!(record.text(0), Some("a"));
        assert_eq!(record.get(1), None);
    }
}
