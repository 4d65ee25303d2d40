//! db-import CLI - import database tables and tab-separated files into PostgreSQL.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use db_import::{
    ColumnType, Config, DriverRegistry, FixedTypeResolver, ImportOptions, MigrateError,
    MigrationOrchestrator, PostgresSink, ProgressObserver, RejectUnknownTypes, TypeResolver,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "db-import")]
#[command(about = "Import database tables and tab-separated files into PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML job file
    #[arg(short, long, default_value = "import.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import the tables described by the job file
    Import {
        /// Create destination tables without copying rows
        #[arg(long)]
        structure_only: bool,

        /// Override the source driver id
        #[arg(long)]
        driver: Option<String>,

        /// Type for columns the driver cannot type (e.g. text, long_text)
        #[arg(long)]
        unknown_type: Option<String>,

        /// Only import tables matching these patterns
        #[arg(long = "include")]
        include: Vec<String>,

        /// Skip tables matching these patterns
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },

    /// Check the job file without connecting anywhere
    Validate,

    /// List available import drivers
    Drivers,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    match cli.command {
        Commands::Drivers => list_drivers(cli.output_json),

        Commands::Validate => {
            let config = Config::load(&cli.config)?;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Job file {:?} is valid", cli.config);
            }
            Ok(())
        }

        Commands::Import {
            structure_only,
            driver,
            unknown_type,
            include,
            exclude,
        } => {
            let mut config = Config::load(&cli.config)?;
            info!("Loaded job from {:?}", cli.config);

            // Apply overrides
            if structure_only {
                config.copy_data = false;
            }
            if let Some(driver) = driver {
                config.source.driver = Some(driver);
            }
            if !include.is_empty() {
                config.include_tables = include;
            }
            if !exclude.is_empty() {
                config.exclude_tables = exclude;
            }
            config.validate()?;

            let resolver: Arc<dyn TypeResolver> = match unknown_type {
                Some(name) => {
                    let ty = ColumnType::parse(&name)
                        .filter(ColumnType::is_known)
                        .ok_or_else(|| {
                            MigrateError::Config(format!("unknown column type '{}'", name))
                        })?;
                    Arc::new(FixedTypeResolver(ty))
                }
                None => Arc::new(RejectUnknownTypes),
            };

            let destination = config.destination.clone().ok_or_else(|| {
                MigrateError::Config("destination is required for import".to_string())
            })?;

            let options = ImportOptions {
                resolver,
                cancel: setup_signal_handler(),
                observer: cli.progress.then(progress_printer),
                ..ImportOptions::default()
            };

            let mut sink = PostgresSink::connect(&destination).await?;
            let mut orchestrator =
                MigrationOrchestrator::new(Arc::new(DriverRegistry::with_builtins()));
            let result = orchestrator
                .perform_import(&config, &mut sink, &options)
                .await;
            sink.close().await;
            let report = result?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                let status_msg = if report.structure_only {
                    "Structure import completed!"
                } else {
                    "Import completed!"
                };
                println!("\n{}", status_msg);
                println!("  Run ID: {}", report.run_id);
                println!("  Driver: {}", report.driver);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!("  Tables: {}", report.tables.len());
                println!("  Rows: {}", report.rows_copied);
                for table in &report.tables {
                    println!("    {} -> {}: {} rows", table.source, table.destination, table.rows);
                }
            }
            Ok(())
        }
    }
}

fn list_drivers(output_json: bool) -> Result<(), MigrateError> {
    let registry = DriverRegistry::with_builtins();
    registry.discover()?;
    for problem in registry.possible_problems() {
        warn!("{}", problem);
    }

    let drivers: Vec<_> = registry
        .driver_ids()
        .iter()
        .filter_map(|id| registry.metadata(id))
        .collect();

    if output_json {
        let metadata: Vec<&db_import::DriverMetadata> = drivers.iter().map(|m| &**m).collect();
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    println!("Available import drivers:");
    for meta in drivers {
        let mut keys = meta.source_systems.clone();
        keys.extend(meta.mime_types.iter().cloned());
        println!(
            "  {:<10} {} (version {}) [{}]",
            meta.id,
            meta.name,
            meta.version,
            keys.join(", ")
        );
    }
    Ok(())
}

/// Observer printing each new percentage as a JSON line on stderr.
fn progress_printer() -> ProgressObserver {
    Arc::new(|percent: u8| {
        eprintln!("{}", serde_json::json!({ "progress": percent }));
    })
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json keeps stdout clean.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current row...", name);
                    token.cancel();
                });
            }
            Err(e) => warn!("Could not install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current row...");
            token.cancel();
        }
    });

    cancel_token
}
