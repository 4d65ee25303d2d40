//! Driver registry: discovery, version filtering, lookup and instance caching.
//!
//! A [`DriverRegistry`] is an explicit value built from a [`PluginLoader`]
//! and passed to whoever needs drivers; there is no process-global registry.
//!
//! # Lifecycle
//!
//! 1. [`discover`](DriverRegistry::discover) runs the loader once, keeps
//!    plugins whose version matches the engine and indexes them.
//! 2. [`driver`](DriverRegistry::driver) instantiates a driver the first time
//!    its id is requested and returns the same shared instance afterwards.
//! 3. [`shutdown`](DriverRegistry::shutdown) drops all cached instances.

mod plugin;

pub use plugin::{
    BuiltinPlugins, DriverFactory, DriverMetadata, DriverPlugin, PluginLoader, ENGINE_VERSION,
    NONUNICODE_ENCODING_PROPERTY,
};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::core::MigrationDriver;
use crate::error::{MigrateError, Result};

/// A driver instance shared between lookups. The orchestrator holds the
/// async lock for the duration of a job.
pub type SharedDriver = Arc<tokio::sync::Mutex<Box<dyn MigrationDriver>>>;

/// Discovery outcome kept so repeated calls report the same failure.
#[derive(Debug, Clone)]
enum DiscoveryFailure {
    NoDrivers,
    LoadFailed { driver: String, message: String },
}

impl DiscoveryFailure {
    fn to_error(&self) -> MigrateError {
        match self {
            DiscoveryFailure::NoDrivers => MigrateError::NoDrivers,
            DiscoveryFailure::LoadFailed { driver, message } => MigrateError::LoadFailed {
                driver: driver.clone(),
                message: message.clone(),
            },
        }
    }
}

struct Registered {
    metadata: Arc<DriverMetadata>,
    factory: DriverFactory,
}

#[derive(Default)]
struct RegistryState {
    discovery: Option<std::result::Result<(), DiscoveryFailure>>,
    /// Keyed by lower-cased id, in discovery order.
    drivers: Vec<(String, Registered)>,
    by_mime_type: HashMap<String, Vec<String>>,
    by_source_system: HashMap<String, Vec<String>>,
    problems: Vec<String>,
    instances: HashMap<String, SharedDriver>,
}

impl RegistryState {
    fn registered(&self, key: &str) -> Option<&Registered> {
        self.drivers.iter().find(|(id, _)| id == key).map(|(_, r)| r)
    }
}

/// Registry of import drivers.
pub struct DriverRegistry {
    loader: Box<dyn PluginLoader>,
    expected_version: String,
    state: Mutex<RegistryState>,
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("DriverRegistry")
            .field("expected_version", &self.expected_version)
            .field(
                "drivers",
                &state.drivers.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            )
            .field("instances", &state.instances.len())
            .finish()
    }
}

impl DriverRegistry {
    /// Create a registry over `loader`. Nothing is loaded until discovery.
    pub fn new(loader: impl PluginLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            expected_version: ENGINE_VERSION.to_string(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Create a registry over the drivers compiled into this crate.
    pub fn with_builtins() -> Self {
        Self::new(BuiltinPlugins)
    }

    /// Override the "MAJOR.MINOR" version plugins must declare.
    pub fn with_expected_version(mut self, version: impl Into<String>) -> Self {
        self.expected_version = version.into();
        self
    }

    pub fn expected_version(&self) -> &str {
        &self.expected_version
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load and index plugins. Only the first call does any work; later calls
    /// return the first call's outcome.
    pub fn discover(&self) -> Result<()> {
        let mut state = self.lock();
        if let Some(outcome) = &state.discovery {
            return outcome.clone().map_err(|f| f.to_error());
        }

        let outcome = self.load_plugins(&mut state);
        state.discovery = Some(outcome.clone());
        outcome.map_err(|f| f.to_error())
    }

    fn load_plugins(&self, state: &mut RegistryState) -> std::result::Result<(), DiscoveryFailure> {
        let plugins = self.loader.load().map_err(|e| DiscoveryFailure::LoadFailed {
            driver: "*".to_string(),
            message: e.to_string(),
        })?;

        for plugin in plugins {
            let meta = plugin.metadata;
            let key = meta.id.trim().to_lowercase();

            if key.is_empty() {
                warn!("Driver \"{}\" has no id, skipping it", meta.name);
                state
                    .problems
                    .push(format!("\"{}\" import driver has no id", meta.name));
                continue;
            }

            if state.registered(&key).is_some() {
                warn!("More than one driver with id \"{}\", skipping duplicate", key);
                state.problems.push(format!(
                    "\"{}\" import driver is registered more than once; only the first is used",
                    key
                ));
                continue;
            }

            if !is_version_string(&meta.version) {
                warn!("Problem with detecting \"{}\" driver's version, skipping it", key);
                state.problems.push(format!(
                    "\"{}\" import driver has unrecognized version; required driver version is \"{}\"",
                    key, self.expected_version
                ));
                continue;
            }

            if meta.version != self.expected_version {
                let mismatch = MigrateError::VersionMismatch {
                    driver: key.clone(),
                    found: meta.version.clone(),
                    expected: self.expected_version.clone(),
                };
                warn!("{}, skipping this driver", mismatch);
                state.problems.push(mismatch.to_string());
                continue;
            }

            for mime in &meta.mime_types {
                state
                    .by_mime_type
                    .entry(mime.to_lowercase())
                    .or_default()
                    .push(key.clone());
            }
            for system in &meta.source_systems {
                state
                    .by_source_system
                    .entry(system.to_lowercase())
                    .or_default()
                    .push(key.clone());
            }

            debug!("Registered import driver {} ({})", key, meta.name);
            state.drivers.push((
                key,
                Registered {
                    metadata: Arc::new(meta),
                    factory: plugin.factory,
                },
            ));
        }

        if state.drivers.is_empty() {
            return Err(DiscoveryFailure::NoDrivers);
        }
        info!("Discovered {} import drivers", state.drivers.len());
        Ok(())
    }

    /// Lower-cased ids of all usable drivers, in discovery order.
    pub fn driver_ids(&self) -> Vec<String> {
        let _ = self.discover();
        self.lock().drivers.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Ids of drivers reading files of `mime_type`.
    pub fn driver_ids_for_mime_type(&self, mime_type: &str) -> Vec<String> {
        let _ = self.discover();
        self.lock()
            .by_mime_type
            .get(&mime_type.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Ids of drivers serving `source_system`.
    pub fn driver_ids_for_source_system(&self, source_system: &str) -> Vec<String> {
        let _ = self.discover();
        self.lock()
            .by_source_system
            .get(&source_system.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Metadata of a usable driver.
    pub fn metadata(&self, id: &str) -> Option<Arc<DriverMetadata>> {
        let _ = self.discover();
        self.lock()
            .registered(&id.to_lowercase())
            .map(|r| r.metadata.clone())
    }

    /// Diagnostics collected during discovery: skipped drivers and why.
    pub fn possible_problems(&self) -> Vec<String> {
        self.lock().problems.clone()
    }

    /// Shared instance of driver `id`, created on first request.
    pub fn driver(&self, id: &str) -> Result<SharedDriver> {
        self.discover()?;
        let key = id.to_lowercase();

        // Instantiation happens under the lock so concurrent lookups of the
        // same id observe a single instance.
        let mut state = self.lock();
        if let Some(driver) = state.instances.get(&key) {
            return Ok(driver.clone());
        }

        let registered = state
            .registered(&key)
            .ok_or_else(|| MigrateError::DriverNotFound(id.to_string()))?;
        let metadata = registered.metadata.clone();

        debug!("Loading import driver {}", key);
        let mut driver = (registered.factory)().map_err(|e| match e {
            MigrateError::LoadFailed { .. } => e,
            other => MigrateError::LoadFailed {
                driver: key.clone(),
                message: other.to_string(),
            },
        })?;
        driver.bind_metadata(metadata);

        let shared: SharedDriver = Arc::new(tokio::sync::Mutex::new(driver));
        state.instances.insert(key, shared.clone());
        Ok(shared)
    }

    /// Drop all cached driver instances. Discovery results are kept.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if !state.instances.is_empty() {
            debug!("Releasing {} driver instances", state.instances.len());
        }
        state.instances.clear();
    }
}

fn is_version_string(version: &str) -> bool {
    let mut parts = version.split('.');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(major), Some(minor), None)
            if major.parse::<u32>().is_ok() && minor.parse::<u32>().is_ok()
    )
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::testing::{meta, StaticLoader};
    use super::*;
    use crate::drivers::testing::FakeDriver;

    #[test]
    fn test_discovery_is_idempotent() {
        let loader = StaticLoader::new(vec![meta("alpha", "1.0"), meta("beta", "1.0")]);
        let calls = loader.calls.clone();
        let registry = DriverRegistry::new(loader).with_expected_version("1.0");

        registry.discover().unwrap();
        let first = registry.driver_ids();
        registry.discover().unwrap();
        assert_eq!(registry.driver_ids(), first);
        assert_eq!(first, vec!["alpha", "beta"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_version_mismatch_is_excluded_with_diagnostic() {
        let loader = StaticLoader::new(vec![
            meta("good", "1.0"),
            meta("old", "0.9"),
            meta("weird", "one"),
        ]);
        let registry = DriverRegistry::new(loader).with_expected_version("1.0");

        assert_eq!(registry.driver_ids(), vec!["good"]);
        let problems = registry.possible_problems();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("\"old\"") && problems[0].contains("0.9"));
        assert!(problems[1].contains("unrecognized version"));
        assert!(matches!(
            registry.driver("old"),
            Err(MigrateError::DriverNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_and_empty_ids_skipped() {
        let loader = StaticLoader::new(vec![
            meta("Alpha", "1.0"),
            meta("alpha", "1.0"),
            meta("", "1.0"),
        ]);
        let registry = DriverRegistry::new(loader).with_expected_version("1.0");

        assert_eq!(registry.driver_ids(), vec!["alpha"]);
        assert_eq!(registry.possible_problems().len(), 2);
    }

    #[test]
    fn test_no_usable_drivers_is_an_error_every_time() {
        let loader = StaticLoader::new(vec![meta("old", "0.1")]);
        let registry = DriverRegistry::new(loader).with_expected_version("1.0");

        assert!(matches!(registry.discover(), Err(MigrateError::NoDrivers)));
        assert!(matches!(registry.discover(), Err(MigrateError::NoDrivers)));
        assert!(matches!(registry.driver("old"), Err(MigrateError::NoDrivers)));
        assert!(registry.driver_ids().is_empty());
    }

    #[test]
    fn test_lookup_by_mime_type_and_source_system() {
        let mut tsv = meta("tsv", "1.0");
        tsv.mime_types = vec!["Text/Tab-Separated-Values".into()];
        tsv.file_based = true;
        let mut maria = meta("mysql", "1.0");
        maria.source_systems = vec!["mysql".into(), "mariadb".into()];
        let registry =
            DriverRegistry::new(StaticLoader::new(vec![tsv, maria])).with_expected_version("1.0");

        assert_eq!(
            registry.driver_ids_for_mime_type("text/tab-separated-values"),
            vec!["tsv"]
        );
        assert_eq!(registry.driver_ids_for_source_system("MariaDB"), vec!["mysql"]);
        assert!(registry.driver_ids_for_source_system("oracle").is_empty());
        assert!(registry.driver_ids_for_mime_type("text/csv").is_empty());
        assert!(registry.metadata("TSV").map(|m| m.file_based).unwrap_or(false));
    }

    #[test]
    fn test_driver_is_a_singleton() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let loader = StaticLoader::with_factory(vec![meta("alpha", "1.0")], move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeDriver::default()) as Box<dyn MigrationDriver>)
        });
        let registry = Arc::new(DriverRegistry::new(loader).with_expected_version("1.0"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.driver("ALPHA").unwrap())
            })
            .collect();
        let drivers: Vec<SharedDriver> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(drivers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        let bound = drivers[0].blocking_lock().metadata().map(|m| m.id.clone());
        assert_eq!(bound.as_deref(), Some("alpha"));
    }

    #[test]
    fn test_factory_failure_is_load_failed() {
        let loader = StaticLoader::with_factory(vec![meta("broken", "1.0")], || {
            Err(MigrateError::connection("library missing"))
        });
        let registry = DriverRegistry::new(loader).with_expected_version("1.0");

        let err = registry.driver("broken").err().unwrap();
        assert!(matches!(err, MigrateError::LoadFailed { ref driver, .. } if driver == "broken"));
        assert!(matches!(
            registry.driver("missing"),
            Err(MigrateError::DriverNotFound(_))
        ));
    }

    #[test]
    fn test_shutdown_releases_instances() {
        let registry =
            DriverRegistry::new(StaticLoader::new(vec![meta("alpha", "1.0")])).with_expected_version("1.0");
        let first = registry.driver("alpha").unwrap();
        registry.shutdown();
        let second = registry.driver("alpha").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_builtins_discover_with_engine_version() {
        let registry = DriverRegistry::with_builtins();
        registry.discover().unwrap();
        assert_eq!(registry.driver_ids(), vec!["postgres", "mysql", "tsv"]);
        assert!(registry.possible_problems().is_empty());
        assert_eq!(registry.driver_ids_for_source_system("mariadb"), vec!["mysql"]);
    }
}
