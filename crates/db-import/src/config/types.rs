//! Configuration type definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root of an import job file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationJobConfig {
    /// Where to import from.
    pub source: SourceConfig,

    /// Where to import into. Required by the CLI; library callers may supply
    /// their own sink instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<DestinationConfig>,

    /// Copy rows as well as table structure (default: true).
    #[serde(default = "default_true")]
    pub copy_data: bool,

    /// Tables to include (glob patterns). Empty means all.
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Tables to exclude (glob patterns).
    #[serde(default)]
    pub exclude_tables: Vec<String>,
}

impl MigrationJobConfig {
    /// A job reading from `source` with default options.
    pub fn new(source: SourceConfig) -> Self {
        Self {
            source,
            destination: None,
            copy_data: true,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
        }
    }

    /// Whether `table` passes the include and exclude patterns.
    ///
    /// Matching is case-insensitive.
    pub fn selects_table(&self, table: &str) -> bool {
        let included = self.include_tables.is_empty()
            || self.include_tables.iter().any(|p| glob_match(p, table));
        included && !self.exclude_tables.iter().any(|p| glob_match(p, table))
    }

    /// Whether a `driver_id` source would read the database the destination
    /// writes to.
    ///
    /// Only the PostgreSQL driver can point at a destination database.
    pub fn source_is_destination(&self, driver_id: &str) -> bool {
        let Some(dest) = &self.destination else {
            return false;
        };
        if !driver_id.eq_ignore_ascii_case("postgres") {
            return false;
        }
        let source = &self.source;
        let host = source.host.as_deref().unwrap_or("localhost");
        host.eq_ignore_ascii_case(&dest.host)
            && source.port.unwrap_or(default_pg_port()) == dest.port
            && source.database.as_deref() == Some(dest.database.as_str())
    }
}

/// Source configuration.
///
/// Exactly how the fields are used depends on the driver: SQL drivers read
/// the network fields, file-based drivers read `path`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Explicit driver id, e.g. "postgres".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,

    /// Source-system id, e.g. "mariadb". Used when `driver` is not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Mime type of a file source. Detected from `path` when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Database host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Database port. Drivers fall back to their engine's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Password (not serialized for security).
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// File or directory for file-based sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Character encoding of file sources ("utf-8" or "latin1").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,

    /// TLS mode for PostgreSQL sources.
    #[serde(default)]
    pub ssl_mode: SslMode,
}

impl SourceConfig {
    /// Source reading a file or directory.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Mime type from the config, or guessed from the file extension.
    pub fn effective_mime_type(&self) -> Option<String> {
        if let Some(mime) = &self.mime_type {
            return Some(mime.to_lowercase());
        }
        let ext = self.path.as_ref()?.extension()?.to_str()?.to_lowercase();
        let mime = match ext.as_str() {
            "tsv" | "tab" => "text/tab-separated-values",
            "txt" => "text/plain",
            "csv" => "text/csv",
            "sql" => "application/sql",
            _ => return None,
        };
        Some(mime.to_string())
    }
}

/// PostgreSQL destination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password (not serialized for security).
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Schema tables are created in (default: public).
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// TLS mode (default: disable).
    #[serde(default)]
    pub ssl_mode: SslMode,
}

/// TLS mode for PostgreSQL connections, named as in libpq.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// Plain TCP.
    #[default]
    Disable,
    /// Encrypt without verifying the server certificate.
    Require,
    /// Verify the certificate chain against the webpki roots.
    VerifyCa,
    /// Verify the chain and the host name.
    VerifyFull,
}

/// Case-insensitive glob match supporting `*` and `?`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();
    glob_match_chars(&pattern, &text)
}

fn glob_match_chars(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => (0..=text.len()).any(|i| glob_match_chars(rest, &text[i..])),
        Some(('?', rest)) => !text.is_empty() && glob_match_chars(rest, &text[1..]),
        Some((c, rest)) => text.first() == Some(c) && glob_match_chars(rest, &text[1..]),
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_true() -> bool {
    true
}
