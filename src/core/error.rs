//! Error types for the database access layer.
//!
//! Every fallible operation in the crate returns [`DbError`]. Driver failures
//! are carried unchanged inside [`DbError::Connect`] and [`DbError::Driver`],
//! so callers can downcast to the concrete driver error when they need to.
use rusqlite::types::FromSqlError;
use thiserror::Error;

/// Boxed error produced by a database driver.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for the database access layer.
///
/// The variants fall into four groups:
/// - process misconfiguration (`AlreadyInitialized`, `NotInitialized`, `Config`)
/// - driver pass-through (`Connect`, `Driver`, `RollbackFailed`)
/// - programmer errors surfaced immediately (`MultiColumns`, `Query`, `ContextInUse`)
/// - row lookups (`KeyNotFound`, `NoSuchAttribute`, `Conversion`)
#[derive(Error, Debug)]
pub enum DbError {
    /// An engine was already installed in this cell
    #[error("Engine is already initialized")]
    AlreadyInitialized,

    /// No engine has been installed yet
    #[error("Engine is not initialized")]
    NotInitialized,

    /// The driver failed to open a physical connection
    #[error("Connect error: {0}")]
    Connect(#[source] DriverError),

    /// A statement, commit, rollback or close failed inside the driver
    #[error("Database error: {0}")]
    Driver(#[source] DriverError),

    /// A scalar query did not return exactly one column
    #[error("Expect only one column, got {0}")]
    MultiColumns(usize),

    /// Commit or rollback was requested without a live connection
    #[error("No connection: the database context has no open connection")]
    NoConnection,

    /// The transaction body failed and the rollback that followed failed too.
    /// `source` is the body's original error.
    #[error("Rollback failed after error: {source}; rollback error: {rollback}")]
    RollbackFailed {
        source: Box<DbError>,
        rollback: Box<DbError>,
    },

    /// Subscript lookup of a column that is not in the row
    #[error("Key not found: '{0}'")]
    KeyNotFound(String),

    /// Attribute-style lookup of a column that is not in the row
    #[error("'RowMapping' object has no attribute '{0}'")]
    NoSuchAttribute(String),

    /// A column value could not be converted to the requested type
    #[error("Cannot convert column '{column}': {source}")]
    Conversion {
        column: String,
        #[source]
        source: FromSqlError,
    },

    /// Malformed statement input (identifiers, empty column lists)
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The thread-bound context was re-entered while already borrowed
    #[error("Thread database context is already in use")]
    ContextInUse,

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        DbError::Driver(Box::new(err))
    }
}

impl DbError {
    /// Returns `true` for the two row lookup failures.
    pub fn is_lookup(&self) -> bool {
        matches!(self, DbError::KeyNotFound(_) | DbError::NoSuchAttribute(_))
    }
}

/// Type alias for Result to use DbError as the error type.
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let db_err = DbError::from(rusqlite::Error::ExecuteReturnedResults);
        assert!(db_err.to_string().contains("Database error"));

        assert_eq!(
            DbError::MultiColumns(2).to_string(),
            "Expect only one column, got 2"
        );
        assert_eq!(
            DbError::NoSuchAttribute("empty".to_string()).to_string(),
            "'RowMapping' object has no attribute 'empty'"
        );
        assert_eq!(
            DbError::KeyNotFound("empty".to_string()).to_string(),
            "Key not found: 'empty'"
        );
    }

    #[test]
    fn test_driver_error_is_kept_as_source() {
        let err = DbError::from(rusqlite::Error::InvalidQuery);
        let source = std::error::Error::source(&err).expect("driver source");
        assert!(source.downcast_ref::<rusqlite::Error>().is_some());
    }

    #[test]
    fn test_rollback_failure_keeps_original_error() {
        let err = DbError::RollbackFailed {
            source: Box::new(DbError::Query("boom".to_string())),
            rollback: Box::new(DbError::NoConnection),
        };
        let msg = err.to_string();
        assert!(msg.contains("boom"));
        assert!(msg.contains("No connection"));
        match err {
            DbError::RollbackFailed { source, .. } => {
                assert!(matches!(*source, DbError::Query(_)))
            }
            _ => panic!("Expected RollbackFailed"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let db_err: DbError = io_err.into();
        assert!(matches!(db_err, DbError::Io(_)));
    }

    #[test]
    fn test_lookup_kinds_are_distinct() {
        let key = DbError::KeyNotFound("x".to_string());
        let attr = DbError::NoSuchAttribute("x".to_string());
        assert!(key.is_lookup() && attr.is_lookup());
        assert!(!matches!(key, DbError::NoSuchAttribute(_)));
        assert!(!matches!(attr, DbError::KeyNotFound(_)));
        assert!(!DbError::NoConnection.is_lookup());
    }
}
