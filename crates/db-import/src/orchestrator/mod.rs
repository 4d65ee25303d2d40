//! Import orchestrator - main workflow coordinator.
//!
//! [`MigrationOrchestrator::perform_import`] drives one job through
//! `Idle → Connected → SchemaPlanned → Copying → Done`. Any failure after a
//! driver has been selected ends in `Failed`; the source is disconnected on
//! every path. Tables already created in the destination are left in place.

mod translate;

pub use translate::{IdentifierTranslator, SchemaTranslator};

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{MigrationJobConfig, SourceConfig};
use crate::core::{
    CopyContext, MigrationDriver, RecordFilter, RejectUnknownTypes, TableSchema, TableSink,
    TypeResolver,
};
use crate::error::{MigrateError, Result};
use crate::progress::{ProgressEstimator, ProgressObserver, ProgressState};
use crate::registry::{DriverRegistry, NONUNICODE_ENCODING_PROPERTY};

/// Where a job currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Idle,
    Connected,
    SchemaPlanned,
    Copying,
    Done,
    Failed,
}

/// Caller-supplied collaborators for a job.
#[derive(Clone)]
pub struct ImportOptions {
    /// Asked for the type of columns the driver cannot type.
    pub resolver: Arc<dyn TypeResolver>,
    pub filter: Option<Arc<dyn RecordFilter>>,
    pub cancel: CancellationToken,
    pub observer: Option<ProgressObserver>,
    pub translator: Arc<dyn SchemaTranslator>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            resolver: Arc::new(RejectUnknownTypes),
            filter: None,
            cancel: CancellationToken::new(),
            observer: None,
            translator: Arc::new(IdentifierTranslator),
        }
    }
}

impl fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportOptions")
            .field("filter", &self.filter.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Rows imported into one destination table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    /// Table name as listed by the driver.
    pub source: String,
    /// Name of the created destination table.
    pub destination: String,
    pub rows: u64,
}

/// Result of a successful import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Id of the driver that read the source.
    pub driver: String,

    pub status: ImportState,

    /// When the import started.
    pub started_at: DateTime<Utc>,

    /// When the import completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Only the structure was imported.
    pub structure_only: bool,

    /// Total rows copied across all tables.
    pub rows_copied: u64,

    /// Weighted size of the job in progress units.
    pub progress_total: u64,

    pub tables: Vec<TableReport>,
}

impl ImportReport {
    /// Serialize the report to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs import jobs against drivers from a registry.
pub struct MigrationOrchestrator {
    registry: Arc<DriverRegistry>,
    state: ImportState,
}

impl MigrationOrchestrator {
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            registry,
            state: ImportState::Idle,
        }
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Pick the driver for `source`: an explicit driver id, else a source
    /// system, else the mime type (explicit or guessed from the file name).
    pub fn select_driver(&self, source: &SourceConfig) -> Result<String> {
        self.registry.discover()?;

        if let Some(id) = &source.driver {
            return Ok(id.to_lowercase());
        }
        if let Some(system) = &source.system {
            return self
                .registry
                .driver_ids_for_source_system(system)
                .into_iter()
                .next()
                .ok_or_else(|| MigrateError::DriverNotFound(format!("source system {}", system)));
        }
        if let Some(mime) = source.effective_mime_type() {
            return self
                .registry
                .driver_ids_for_mime_type(&mime)
                .into_iter()
                .next()
                .ok_or_else(|| MigrateError::DriverNotFound(format!("mime type {}", mime)));
        }
        Err(MigrateError::DriverNotFound(
            "no driver, source system or mime type given".to_string(),
        ))
    }

    /// Import the tables selected by `job` into `sink`.
    pub async fn perform_import(
        &mut self,
        job: &MigrationJobConfig,
        sink: &mut dyn TableSink,
        options: &ImportOptions,
    ) -> Result<ImportReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        self.state = ImportState::Idle;
        info!("Starting import run: {}", run_id);

        let driver_id = self.select_driver(&job.source)?;
        let shared = self.registry.driver(&driver_id)?;

        // Held for the whole job: one job per driver instance at a time.
        let mut driver = shared.lock_owned().await;
        let result = self.run(&mut **driver, job, sink, options).await;

        match result {
            Ok((tables, progress)) => {
                self.state = ImportState::Done;
                let completed_at = Utc::now();
                let report = ImportReport {
                    run_id,
                    driver: driver_id,
                    status: self.state,
                    started_at,
                    completed_at,
                    duration_seconds: (completed_at - started_at).num_milliseconds() as f64
                        / 1000.0,
                    structure_only: !job.copy_data,
                    rows_copied: tables.iter().map(|t| t.rows).sum(),
                    progress_total: progress.total,
                    tables,
                };
                info!(
                    "Import completed: {} tables, {} rows in {:.1}s",
                    report.tables.len(),
                    report.rows_copied,
                    report.duration_seconds
                );
                Ok(report)
            }
            Err(e) => {
                if let Err(d) = driver.disconnect().await {
                    warn!("Disconnect after failed import also failed: {}", d);
                }
                self.state = ImportState::Failed;
                if e.is_cancelled() {
                    warn!("Import run {} cancelled", run_id);
                } else {
                    warn!("Import run {} failed: {}", run_id, e);
                }
                Err(e)
            }
        }
    }

    async fn run(
        &mut self,
        driver: &mut dyn MigrationDriver,
        job: &MigrationJobConfig,
        sink: &mut dyn TableSink,
        options: &ImportOptions,
    ) -> Result<(Vec<TableReport>, ProgressState)> {
        if job.source_is_destination(&driver.driver_id()) {
            return Err(MigrateError::Config(
                "source database is the same as the destination".to_string(),
            ));
        }

        // Phase 1: Connect and enumerate
        info!("Phase 1: Connecting to source ({})", driver.driver_id());
        driver.connect(job).await?;
        self.state = ImportState::Connected;

        let maybe_legacy_encoding = driver
            .property(NONUNICODE_ENCODING_PROPERTY)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if maybe_legacy_encoding && job.source.encoding.is_none() {
            warn!("Source may not be Unicode; set source.encoding if imported text looks wrong");
        }

        let tables: Vec<String> = driver
            .list_tables()
            .await?
            .into_iter()
            .filter(|t| job.selects_table(t))
            .collect();
        if tables.is_empty() {
            return Err(MigrateError::schema("no tables to import"));
        }
        info!("Found {} tables to import", tables.len());

        // Phase 2: Plan every destination table before touching the sink
        info!("Phase 2: Reading table schemas");
        let mut plan: Vec<(String, TableSchema)> = Vec::with_capacity(tables.len());
        for name in &tables {
            let source = driver
                .read_table_schema(name, options.resolver.as_ref())
                .await?;
            let dest = options.translator.translate(&source)?;
            debug!(
                "Planned {} -> {} ({} columns)",
                source.caption,
                dest.name,
                dest.column_count()
            );
            plan.push((name.clone(), dest));
        }
        self.state = ImportState::SchemaPlanned;

        // Phase 3: Create tables and copy rows
        info!(
            "Phase 3: Creating tables{}",
            if job.copy_data { " and copying data" } else { "" }
        );
        let mut progress = match &options.observer {
            Some(observer) => ProgressEstimator::with_observer(observer.clone()),
            None => ProgressEstimator::new(),
        };
        // Without per-row reports every table weighs the same and progress
        // moves only when a table finishes.
        let per_row = job.copy_data && driver.supports_progress();
        if per_row {
            progress.initialize(&mut *driver, &tables).await;
        } else {
            progress.initialize_with_sizes(tables.iter().map(|t| (t.clone(), Some(1))));
        }
        self.state = ImportState::Copying;

        let mut reports = Vec::with_capacity(plan.len());
        for (source_name, dest) in &plan {
            if options.cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }

            sink.create_table(dest).await.map_err(|e| {
                MigrateError::copy_with(
                    &dest.name,
                    format!("could not create table: {}", e.message),
                    e.server_message,
                )
            })?;

            let weight = progress.weight_of(source_name);
            let before = progress.state().done;
            let mut unreported = ProgressEstimator::new();
            let rows = if job.copy_data {
                let tracker = if per_row { &mut progress } else { &mut unreported };
                let mut ctx = CopyContext::new(tracker, options.cancel.clone());
                driver
                    .copy_table(source_name, dest, sink, options.filter.as_deref(), &mut ctx)
                    .await?
            } else {
                0
            };
            let advanced = progress.state().done.saturating_sub(before);
            progress.finish_table(weight, advanced);

            debug!("Imported {} rows into {}", rows, dest.name);
            reports.push(TableReport {
                source: source_name.clone(),
                destination: dest.name.clone(),
                rows,
            });
        }

        // Phase 4: Release the source
        info!("Phase 4: Disconnecting from source");
        driver.disconnect().await?;
        Ok((reports, progress.state()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::config::DestinationConfig;
    use crate::core::copy::testing::MemorySink;
    use crate::core::{ColumnType, CopyContext, RecordFilter, TypeResolver, Value};
    use crate::drivers::testing::{FakeDialect, FakeDriver, FakeTable};
    use crate::progress::DEFAULT_TABLE_WEIGHT;
    use crate::registry::testing::{meta, StaticLoader};
    use crate::registry::DriverMetadata;

    struct Fixture {
        orchestrator: MigrationOrchestrator,
        connects: Arc<AtomicUsize>,
        disconnects: Arc<AtomicUsize>,
    }

    fn fixture(tables: Vec<FakeTable>) -> Fixture {
        let connects = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));
        let (c, d) = (connects.clone(), disconnects.clone());
        let mut metadata = meta("fake", "1.0");
        metadata.source_systems = vec!["fakesql".to_string()];

        let loader = StaticLoader::with_factory(vec![metadata], move || {
            let dialect = FakeDialect {
                tables: tables.clone(),
                connects: c.clone(),
                disconnects: d.clone(),
                ..FakeDialect::default()
            };
            Ok(Box::new(FakeDriver::new(dialect)) as Box<dyn MigrationDriver>)
        });
        let registry = DriverRegistry::new(loader).with_expected_version("1.0");
        Fixture {
            orchestrator: MigrationOrchestrator::new(Arc::new(registry)),
            connects,
            disconnects,
        }
    }

    fn job() -> MigrationJobConfig {
        MigrationJobConfig::new(SourceConfig {
            driver: Some("fake".to_string()),
            ..SourceConfig::default()
        })
    }

    fn two_tables() -> Vec<FakeTable> {
        vec![
            FakeTable::new("A")
                .column("id", "int")
                .column("Name", "varchar")
                .row(vec![Some("1"), Some("x")])
                .row(vec![Some("2"), None])
                .row(vec![Some("3"), Some("z")])
                .with_count("100")
                .with_constraint("id", true, false),
            FakeTable::new("B")
                .column("id", "int")
                .column("shape", "geometry")
                .row(vec![Some("7"), Some("POINT(0 0)")])
                .row(vec![Some("8"), None])
                .with_count("n/a"),
        ]
    }

    fn recording_observer() -> (ProgressObserver, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: ProgressObserver = Arc::new(move |p: u8| sink.lock().unwrap().push(p));
        (observer, seen)
    }

    #[tokio::test]
    async fn test_end_to_end_import() {
        let mut fx = fixture(two_tables());
        let asked = Arc::new(Mutex::new(Vec::new()));
        let log = asked.clone();
        let (observer, seen) = recording_observer();
        let options = ImportOptions {
            resolver: Arc::new(move |column: &str| -> std::result::Result<ColumnType, String> {
                log.lock().unwrap().push(column.to_string());
                Ok(ColumnType::Text)
            }),
            observer: Some(observer),
            ..ImportOptions::default()
        };

        let mut sink = MemorySink::default();
        let report = fx
            .orchestrator
            .perform_import(&job(), &mut sink, &options)
            .await
            .unwrap();

        assert_eq!(fx.orchestrator.state(), ImportState::Done);
        assert_eq!(report.status, ImportState::Done);
        assert_eq!(report.tables.len(), 2);
        assert_eq!(report.rows_copied, 5);
        // A is sized by its row count, B falls back to the default weight.
        assert_eq!(report.progress_total, 100 + DEFAULT_TABLE_WEIGHT);
        assert_eq!(*asked.lock().unwrap(), vec!["b.shape"]);

        assert_eq!(sink.tables.len(), 2);
        assert_eq!(sink.tables[0].name, "a");
        assert_eq!(sink.tables[0].caption, "A");
        assert_eq!(sink.tables[0].columns[1].name, "name");
        assert!(sink.tables[0].columns[0].primary_key);
        assert_eq!(sink.tables[1].columns[1].column_type, ColumnType::Text);
        assert_eq!(
            sink.rows_for("a")[1],
            &vec![Value::Int64(2), Value::Null]
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));

        assert_eq!(fx.connects.load(Ordering::SeqCst), 1);
        assert_eq!(fx.disconnects.load(Ordering::SeqCst), 1);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"rows_copied\": 5"));
    }

    #[tokio::test]
    async fn test_structure_only_creates_tables_without_rows() {
        let mut fx = fixture(two_tables());
        let mut job = job();
        job.copy_data = false;
        let options = ImportOptions {
            resolver: Arc::new(crate::core::FixedTypeResolver(ColumnType::LongText)),
            ..ImportOptions::default()
        };

        let mut sink = MemorySink::default();
        let report = fx
            .orchestrator
            .perform_import(&job, &mut sink, &options)
            .await
            .unwrap();
        assert!(report.structure_only);
        assert_eq!(report.progress_total, 2);
        assert_eq!(sink.tables.len(), 2);
        assert!(sink.rows.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_type_fails_before_creating_tables() {
        let mut fx = fixture(two_tables());
        let mut sink = MemorySink::default();
        let err = fx
            .orchestrator
            .perform_import(&job(), &mut sink, &ImportOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::TypeResolution { .. }));
        assert!(sink.tables.is_empty());
        assert_eq!(fx.orchestrator.state(), ImportState::Failed);
        assert_eq!(fx.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_at_row_boundary() {
        let mut fx = fixture(vec![FakeTable::new("t")
            .column("id", "int")
            .row(vec![Some("1")])
            .row(vec![Some("2")])
            .row(vec![Some("3")])]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let options = ImportOptions {
            cancel,
            observer: Some(Arc::new(move |p: u8| {
                if p > 0 {
                    trigger.cancel();
                }
            })),
            ..ImportOptions::default()
        };

        let mut sink = MemorySink::default();
        let err = fx
            .orchestrator
            .perform_import(&job(), &mut sink, &options)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(sink.rows.len(), 1);
        assert_eq!(fx.orchestrator.state(), ImportState::Failed);
        assert_eq!(fx.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_tables_is_schema_error() {
        let mut fx = fixture(Vec::new());
        let mut sink = MemorySink::default();
        let err = fx
            .orchestrator
            .perform_import(&job(), &mut sink, &ImportOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::Schema { .. }));
        assert!(err.to_string().contains("no tables to import"));
        assert_eq!(fx.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_table_patterns_select_tables() {
        let tables = ["a", "ab", "abc", "b"]
            .iter()
            .map(|n| FakeTable::new(n).column("id", "int"))
            .collect();
        let mut fx = fixture(tables);
        let mut job = job();
        job.include_tables = vec!["a*".to_string()];
        job.exclude_tables = vec!["ab".to_string()];

        let mut sink = MemorySink::default();
        let report = fx
            .orchestrator
            .perform_import(&job, &mut sink, &ImportOptions::default())
            .await
            .unwrap();
        let imported: Vec<&str> = report.tables.iter().map(|t| t.source.as_str()).collect();
        assert_eq!(imported, vec!["a", "abc"]);
    }

    #[tokio::test]
    async fn test_sink_failure_is_copy_error() {
        let mut fx = fixture(two_tables());
        let options = ImportOptions {
            resolver: Arc::new(crate::core::FixedTypeResolver(ColumnType::Text)),
            ..ImportOptions::default()
        };
        let mut sink = MemorySink {
            fail_insert_at: Some(2),
            ..MemorySink::default()
        };

        let err = fx
            .orchestrator
            .perform_import(&job(), &mut sink, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Copy { .. }));
        assert_eq!(err.server_message(), Some("constraint violated"));
        assert_eq!(sink.rows.len(), 1);
        assert_eq!(fx.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_driver_selection() {
        let fx = fixture(Vec::new());
        let by_system = SourceConfig {
            system: Some("FakeSQL".to_string()),
            ..SourceConfig::default()
        };
        assert_eq!(fx.orchestrator.select_driver(&by_system).unwrap(), "fake");

        let unknown = SourceConfig {
            system: Some("oracle".to_string()),
            ..SourceConfig::default()
        };
        assert!(matches!(
            fx.orchestrator.select_driver(&unknown),
            Err(MigrateError::DriverNotFound(_))
        ));

        let mut fx = fixture(Vec::new());
        let mut job = job();
        job.source.driver = Some("nope".to_string());
        let err = fx
            .orchestrator
            .perform_import(&job, &mut MemorySink::default(), &ImportOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::DriverNotFound(_)));
        assert_eq!(fx.orchestrator.state(), ImportState::Idle);
        assert_eq!(fx.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tsv_import_with_builtin_drivers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Price List.tsv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"Item\tUnit Price\nbolt\t0.10\nnut\t0.05\n")
            .unwrap();

        let mut orchestrator = MigrationOrchestrator::new(Arc::new(DriverRegistry::with_builtins()));
        let (observer, seen) = recording_observer();
        let options = ImportOptions {
            observer: Some(observer),
            ..ImportOptions::default()
        };
        let mut sink = MemorySink::default();
        let report = orchestrator
            .perform_import(
                &MigrationJobConfig::new(SourceConfig::file(&path)),
                &mut sink,
                &options,
            )
            .await
            .unwrap();

        assert_eq!(report.driver, "tsv");
        assert_eq!(report.rows_copied, 2);
        assert_eq!(sink.tables[0].name, "price_list");
        assert_eq!(sink.tables[0].caption, "Price List");
        assert_eq!(sink.tables[0].columns[1].name, "unit_price");
        assert_eq!(
            sink.rows_for("price_list")[1],
            &vec![Value::Text("nut".into()), Value::Text("0.05".into())]
        );
        assert_eq!(seen.lock().unwrap().last(), Some(&100));
    }

    /// Wraps the fake driver but reports no per-row progress.
    struct TableLevelDriver(FakeDriver);

    #[async_trait::async_trait]
    impl MigrationDriver for TableLevelDriver {
        fn metadata(&self) -> Option<Arc<DriverMetadata>> {
            self.0.metadata()
        }

        fn bind_metadata(&mut self, metadata: Arc<DriverMetadata>) {
            self.0.bind_metadata(metadata)
        }

        async fn connect(&mut self, job: &MigrationJobConfig) -> Result<()> {
            self.0.connect(job).await
        }

        async fn disconnect(&mut self) -> Result<()> {
            self.0.disconnect().await
        }

        async fn list_tables(&mut self) -> Result<Vec<String>> {
            self.0.list_tables().await
        }

        async fn read_table_schema(
            &mut self,
            name: &str,
            resolver: &dyn TypeResolver,
        ) -> Result<TableSchema> {
            self.0.read_table_schema(name, resolver).await
        }

        async fn table_size(&mut self, _name: &str) -> Result<Option<u64>> {
            panic!("sizes are not needed without per-row progress");
        }

        async fn copy_table(
            &mut self,
            source_name: &str,
            dest: &TableSchema,
            sink: &mut dyn TableSink,
            filter: Option<&dyn RecordFilter>,
            ctx: &mut CopyContext<'_>,
        ) -> Result<u64> {
            self.0.copy_table(source_name, dest, sink, filter, ctx).await
        }

        fn supports_progress(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_table_level_progress_without_row_reports() {
        let loader = StaticLoader::with_factory(vec![meta("fake", "1.0")], || {
            let driver = FakeDriver::new(FakeDialect::with_tables(two_tables()));
            Ok(Box::new(TableLevelDriver(driver)) as Box<dyn MigrationDriver>)
        });
        let registry = DriverRegistry::new(loader).with_expected_version("1.0");
        let mut orchestrator = MigrationOrchestrator::new(Arc::new(registry));
        let (observer, seen) = recording_observer();
        let options = ImportOptions {
            resolver: Arc::new(crate::core::FixedTypeResolver(ColumnType::Text)),
            observer: Some(observer),
            ..ImportOptions::default()
        };

        let mut sink = MemorySink::default();
        let report = orchestrator
            .perform_import(&job(), &mut sink, &options)
            .await
            .unwrap();

        assert_eq!(report.rows_copied, 5);
        assert_eq!(report.progress_total, 2);
        assert_eq!(*seen.lock().unwrap(), vec![0, 50, 100]);
    }

    #[tokio::test]
    async fn test_import_into_source_database_is_refused() {
        let mut orchestrator = MigrationOrchestrator::new(Arc::new(DriverRegistry::with_builtins()));
        let mut job = MigrationJobConfig::new(SourceConfig {
            driver: Some("postgres".to_string()),
            host: Some("db.local".to_string()),
            database: Some("shop".to_string()),
            ..SourceConfig::default()
        });
        job.destination = Some(DestinationConfig {
            host: "DB.LOCAL".to_string(),
            port: 5432,
            database: "shop".to_string(),
            user: "app".to_string(),
            password: String::new(),
            schema: "public".to_string(),
            ssl_mode: Default::default(),
        });

        let mut sink = MemorySink::default();
        let err = orchestrator
            .perform_import(&job, &mut sink, &ImportOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::Config(_)));
        assert!(err.to_string().contains("same as the destination"));
        assert_eq!(orchestrator.state(), ImportState::Failed);
        assert!(sink.tables.is_empty());
    }
}
