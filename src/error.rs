//! Error types for the CRUD core.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Every variant carries enough structure (kind, table, identifier) for the HTTP
//! layer to render a precise response without parsing messages.

use thiserror::Error;

/// SQLSTATE raised by PostgreSQL for unique constraint violations.
pub const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("{table} '{id}' not found")]
    NotFound { table: String, id: String },

    #[error("Conflict in {table}: {message}")]
    Conflict {
        table: String,
        message: String,
        constraint: Option<String>,
    },

    #[error("Validation failed for {table}{}: {message}", field_suffix(.field))]
    Validation {
        table: String,
        field: Option<String>,
        message: String,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Unknown table: {table}")]
    UnknownTable { table: String },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Migration '{file}' failed: {message}")]
    Migration { file: String, message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Timeout: {operation} {}", limit_suffix(.limit_secs))]
    Timeout {
        operation: String,
        /// The limit that tripped, when the caller knows it
        limit_secs: Option<u32>,
    },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a not-found error for a primary key lookup.
    pub fn not_found(table: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            table: table.into(),
            id: id.to_string(),
        }
    }

    /// Create a uniqueness conflict error.
    pub fn conflict(
        table: impl Into<String>,
        message: impl Into<String>,
        constraint: Option<String>,
    ) -> Self {
        Self::Conflict {
            table: table.into(),
            message: message.into(),
            constraint,
        }
    }

    /// Create a validation error for a whole record.
    pub fn validation(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            table: table.into(),
            field: None,
            message: message.into(),
        }
    }

    /// Create a validation error pinned to a single field.
    pub fn field_validation(
        table: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            table: table.into(),
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an unknown table error.
    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::UnknownTable {
            table: table.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create a migration error for the given file.
    pub fn migration(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Migration {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error for a known limit.
    pub fn timeout(operation: impl Into<String>, limit_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit_secs: Some(limit_secs),
        }
    }

    /// Create a timeout error when the limit is not known here.
    pub fn timed_out(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit_secs: None,
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Map a driver error raised while writing to `table`.
    ///
    /// Unique violations become [`DbError::Conflict`] naming the table; everything
    /// else goes through the generic conversion.
    pub fn from_write(table: &str, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if is_unique_violation(&**db_err) {
                return Self::conflict(
                    table,
                    db_err.message(),
                    db_err.constraint().map(str::to_string),
                );
            }
        }
        Self::from(err)
    }

    /// Short machine-readable kind, used in API error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Validation { .. } => "validation",
            Self::InvalidInput { .. } => "invalid_input",
            Self::UnknownTable { .. } => "unknown_table",
            Self::Schema { .. } => "schema",
            Self::Migration { .. } => "migration",
            Self::Connection { .. } => "connection",
            Self::Timeout { .. } => "timeout",
            Self::Database { .. } => "database",
            Self::Internal { .. } => "internal",
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is retryable by the caller.
    ///
    /// The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

fn limit_suffix(limit_secs: &Option<u32>) -> String {
    match limit_secs {
        Some(secs) => format!("exceeded {secs}s"),
        None => "timed out".to_string(),
    }
}

fn field_suffix(field: &Option<String>) -> String {
    field.as_deref().map(|f| format!(".{f}")).unwrap_or_default()
}

fn is_unique_violation(err: &dyn sqlx::error::DatabaseError) -> bool {
    err.is_unique_violation() || err.code().as_deref() == Some(UNIQUE_VIOLATION)
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                if is_unique_violation(&*db_err) {
                    return DbError::conflict(
                        "(unknown)",
                        db_err.message(),
                        db_err.constraint().map(str::to_string),
                    );
                }
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timed_out("connection pool acquire"),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Restart the service")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => DbError::schema(
                format!("Type not found: {}", type_name),
                type_name.to_string(),
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col.to_string())
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
