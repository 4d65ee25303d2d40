//! Error types for the import library.

use thiserror::Error;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for source connection failures.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for schema and type resolution failures.
pub const EXIT_SCHEMA_ERROR: u8 = 3;
/// Exit code for failures while copying rows.
pub const EXIT_COPY_ERROR: u8 = 4;
/// Exit code for driver lookup and loading failures.
pub const EXIT_DRIVER_ERROR: u8 = 5;
/// Exit code for a user-requested abort.
pub const EXIT_CANCELLED: u8 = 6;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for import operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Could not connect to the source.
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        server_message: Option<String>,
    },

    /// Could not enumerate tables or read a table's structure.
    #[error("Schema error: {message}")]
    Schema {
        message: String,
        server_message: Option<String>,
    },

    /// The type-resolution callback failed or returned an unusable type.
    #[error("Could not resolve type of column {column}: {message}")]
    TypeResolution { column: String, message: String },

    /// Failure while streaming rows, including destination-side insert failures.
    #[error("Copy failed for table {table}: {message}")]
    Copy {
        table: String,
        message: String,
        server_message: Option<String>,
    },

    /// No driver is registered under this id.
    #[error("Could not find import driver \"{0}\"")]
    DriverNotFound(String),

    /// Driver plugin instantiation failed.
    #[error("Could not load import driver \"{driver}\": {message}")]
    LoadFailed { driver: String, message: String },

    /// Driver version does not match the engine. Only recorded as a diagnostic.
    #[error("\"{driver}\" import driver has version \"{found}\" but required driver version is \"{expected}\"")]
    VersionMismatch {
        driver: String,
        found: String,
        expected: String,
    },

    /// Discovery left no usable driver.
    #[error("Could not find any import drivers")]
    NoDrivers,

    /// Import was cancelled by the caller.
    #[error("Import cancelled")]
    Cancelled,

    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.into(),
            server_message: None,
        }
    }

    /// Create a Connection error carrying the driver's own message.
    pub fn connection_with(message: impl Into<String>, server: impl ToString) -> Self {
        MigrateError::Connection {
            message: message.into(),
            server_message: Some(server.to_string()),
        }
    }

    /// Create a Schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        MigrateError::Schema {
            message: message.into(),
            server_message: None,
        }
    }

    /// Create a Schema error carrying the driver's own message.
    pub fn schema_with(message: impl Into<String>, server: impl ToString) -> Self {
        MigrateError::Schema {
            message: message.into(),
            server_message: Some(server.to_string()),
        }
    }

    /// Create a Copy error.
    pub fn copy(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Copy {
            table: table.into(),
            message: message.into(),
            server_message: None,
        }
    }

    /// Create a Copy error carrying the driver's own message.
    pub fn copy_with(
        table: impl Into<String>,
        message: impl Into<String>,
        server: Option<String>,
    ) -> Self {
        MigrateError::Copy {
            table: table.into(),
            message: message.into(),
            server_message: server,
        }
    }

    /// Lower-level message reported by the source or destination, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            MigrateError::Connection { server_message, .. }
            | MigrateError::Schema { server_message, .. }
            | MigrateError::Copy { server_message, .. } => server_message.as_deref(),
            _ => None,
        }
    }

    /// Whether this error is a user-requested abort rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MigrateError::Cancelled)
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connection { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::Schema { .. } | MigrateError::TypeResolution { .. } => {
                EXIT_SCHEMA_ERROR
            }
            MigrateError::Copy { .. } => EXIT_COPY_ERROR,
            MigrateError::DriverNotFound(_)
            | MigrateError::LoadFailed { .. }
            | MigrateError::VersionMismatch { .. }
            | MigrateError::NoDrivers => EXIT_DRIVER_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        if let Some(server) = self.server_message() {
            output.push_str(&format!("\nServer message:\n  {}", server));
        }

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for import operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
