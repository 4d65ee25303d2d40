//! Configuration validation.

use super::MigrationJobConfig;
use crate::error::{MigrateError, Result};

const SUPPORTED_ENCODINGS: [&str; 5] = ["utf-8", "utf8", "latin1", "latin-1", "iso-8859-1"];

/// Validate the configuration.
pub fn validate(config: &MigrationJobConfig) -> Result<()> {
    let source = &config.source;

    // Source validation
    if source.driver.is_none()
        && source.system.is_none()
        && source.effective_mime_type().is_none()
    {
        return Err(MigrateError::Config(
            "one of source.driver, source.system or source.mime_type is required \
             (or a source.path with a known extension)"
                .into(),
        ));
    }
    for (field, value) in [
        ("source.driver", &source.driver),
        ("source.system", &source.system),
        ("source.host", &source.host),
        ("source.database", &source.database),
    ] {
        if matches!(value, Some(v) if v.trim().is_empty()) {
            return Err(MigrateError::Config(format!("{} cannot be empty", field)));
        }
    }
    if let Some(encoding) = &source.encoding {
        if !SUPPORTED_ENCODINGS.contains(&encoding.to_lowercase().as_str()) {
            return Err(MigrateError::Config(format!(
                "source.encoding must be 'utf-8' or 'latin1', got '{}'",
                encoding
            )));
        }
    }

    // Destination validation
    if let Some(dest) = &config.destination {
        if dest.host.is_empty() {
            return Err(MigrateError::Config("destination.host is required".into()));
        }
        if dest.database.is_empty() {
            return Err(MigrateError::Config(
                "destination.database is required".into(),
            ));
        }
        if dest.user.is_empty() {
            return Err(MigrateError::Config("destination.user is required".into()));
        }
        if dest.schema.is_empty() {
            return Err(MigrateError::Config(
                "destination.schema cannot be empty".into(),
            ));
        }
    }

    // Table patterns
    if config
        .include_tables
        .iter()
        .chain(&config.exclude_tables)
        .any(|p| p.trim().is_empty())
    {
        return Err(MigrateError::Config(
            "table patterns cannot be empty".into(),
        ));
    }

    Ok(())
}
