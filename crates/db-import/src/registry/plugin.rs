//! Driver plugin metadata and loading.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::MigrationDriver;
use crate::drivers::{MysqlDialect, PostgresDialect, SqlMigrationDriver, TsvMigrationDriver};
use crate::error::Result;

/// Static description of a driver, as shipped with its plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverMetadata {
    /// Unique id, compared case-insensitively.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Mime types of file sources this driver reads.
    #[serde(default)]
    pub mime_types: Vec<String>,

    /// Source-system ids this driver serves, e.g. "mysql", "mariadb".
    #[serde(default)]
    pub source_systems: Vec<String>,

    /// Whether the source is a file rather than a server.
    #[serde(default)]
    pub file_based: bool,

    /// Driver interface version as "MAJOR.MINOR".
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Driver-specific properties, e.g. [`NONUNICODE_ENCODING_PROPERTY`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// Property set by drivers whose sources may not be Unicode, so callers know
/// to ask for `source.encoding`.
pub const NONUNICODE_ENCODING_PROPERTY: &str = "source_database_has_nonunicode_encoding";

impl DriverMetadata {
    /// Parse metadata from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Property `name`, looked up case-insensitively.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether property `name` is set to "true".
    pub fn flag(&self, name: &str) -> bool {
        self.property(name)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

/// Creates a new, unconnected driver instance.
pub type DriverFactory = Arc<dyn Fn() -> Result<Box<dyn MigrationDriver>> + Send + Sync>;

/// A loadable driver: metadata plus a factory.
#[derive(Clone)]
pub struct DriverPlugin {
    pub metadata: DriverMetadata,
    pub factory: DriverFactory,
}

impl DriverPlugin {
    pub fn new<F>(metadata: DriverMetadata, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn MigrationDriver>> + Send + Sync + 'static,
    {
        Self {
            metadata,
            factory: Arc::new(factory),
        }
    }
}

impl fmt::Debug for DriverPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverPlugin")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Enumerates the driver plugins available to a registry.
pub trait PluginLoader: Send + Sync {
    fn load(&self) -> Result<Vec<DriverPlugin>>;
}

/// Engine driver interface version, "MAJOR.MINOR" of this crate.
pub const ENGINE_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION_MAJOR"),
    ".",
    env!("CARGO_PKG_VERSION_MINOR")
);

/// The drivers compiled into this crate: PostgreSQL, MySQL/MariaDB and TSV.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinPlugins;

impl BuiltinPlugins {
    fn metadata(
        id: &str,
        name: &str,
        mime_types: &[&str],
        source_systems: &[&str],
        file_based: bool,
        description: &str,
    ) -> DriverMetadata {
        DriverMetadata {
            id: id.to_string(),
            name: name.to_string(),
            mime_types: mime_types.iter().map(|s| s.to_string()).collect(),
            source_systems: source_systems.iter().map(|s| s.to_string()).collect(),
            file_based,
            version: ENGINE_VERSION.to_string(),
            description: Some(description.to_string()),
            properties: BTreeMap::new(),
        }
    }
}

impl PluginLoader for BuiltinPlugins {
    fn load(&self) -> Result<Vec<DriverPlugin>> {
        Ok(vec![
            DriverPlugin::new(
                Self::metadata(
                    "postgres",
                    "PostgreSQL",
                    &[],
                    &["postgres", "postgresql", "pg"],
                    false,
                    "Imports tables from a PostgreSQL server",
                ),
                || Ok(Box::new(SqlMigrationDriver::new(PostgresDialect::new())) as Box<dyn MigrationDriver>),
            ),
            DriverPlugin::new(
                Self::metadata(
                    "mysql",
                    "MySQL / MariaDB",
                    &[],
                    &["mysql", "mariadb"],
                    false,
                    "Imports tables from a MySQL or MariaDB server",
                ),
                || Ok(Box::new(SqlMigrationDriver::new(MysqlDialect::new())) as Box<dyn MigrationDriver>),
            ),
            DriverPlugin::new(
                {
                    let mut metadata = Self::metadata(
                        "tsv",
                        "Tab-separated text",
                        &["text/tab-separated-values", "text/plain"],
                        &["tsv"],
                        true,
                        "Imports tab-separated text files with a header line",
                    );
                    metadata
                        .properties
                        .insert(NONUNICODE_ENCODING_PROPERTY.to_string(), "true".to_string());
                    metadata
                },
                || Ok(Box::new(TsvMigrationDriver::new()) as Box<dyn MigrationDriver>),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_from_json() {
        let json = r#"{"id": "xbase", "name": "xBase", "version": "0.1", "file_based": true,
                       "mime_types": ["application/x-dbase"]}"#;
        let meta = DriverMetadata::from_json(json).unwrap();
        assert_eq!(meta.id, "xbase");
        assert!(meta.file_based);
        assert!(meta.source_systems.is_empty());
        assert!(meta.description.is_none());
        assert!(meta.properties.is_empty());
    }

    #[test]
    fn test_properties_are_case_insensitive() {
        let json = r#"{"id": "mdb", "name": "MS Access", "version": "0.1",
                       "properties": {"Source_Database_Has_NonUnicode_Encoding": "TRUE"}}"#;
        let meta = DriverMetadata::from_json(json).unwrap();
        assert_eq!(
            meta.property(NONUNICODE_ENCODING_PROPERTY),
            Some("TRUE")
        );
        assert!(meta.flag("SOURCE_DATABASE_HAS_NONUNICODE_ENCODING"));
        assert!(!meta.flag("missing"));
    }

    #[test]
    fn test_builtins_match_engine_version() {
        let plugins = BuiltinPlugins.load().unwrap();
        let ids: Vec<_> = plugins.iter().map(|p| p.metadata.id.as_str()).collect();
        assert_eq!(ids, vec!["postgres", "mysql", "tsv"]);
        assert!(plugins.iter().all(|p| p.metadata.version == ENGINE_VERSION));
        // Only file sources may carry a legacy encoding.
        let flagged: Vec<_> = plugins
            .iter()
            .filter(|p| p.metadata.flag(NONUNICODE_ENCODING_PROPERTY))
            .map(|p| p.metadata.id.as_str())
            .collect();
        assert_eq!(flagged, vec!["tsv"]);
    }

    #[test]
    fn test_builtin_factories_create_unbound_drivers() {
        for plugin in BuiltinPlugins.load().unwrap() {
            let driver = (plugin.factory)().unwrap();
            assert!(driver.metadata().is_none());
            assert!(driver.supports_progress());
        }
    }
}
