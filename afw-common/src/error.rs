//! Common error types for AFW

use thiserror::Error;

/// Common result type for AFW operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across AFW services
#[derive(Error, Debug)]
pub enum Error {
    /// Storage failure tagged with the operation and entity it happened in.
    ///
    /// The display text deliberately omits the driver message; the source is
    /// still reachable through `std::error::Error::source` for logging.
    #[error("Database error during {operation} on {entity}")]
    Database {
        operation: &'static str,
        entity: String,
        #[source]
        source: sqlx::Error,
    },

    /// Storage failure outside any entity operation (startup, schema sync)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Concurrent modification could not be reconciled
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a storage error with the operation and entity it occurred in
    pub fn database(operation: &'static str, entity: impl Into<String>, source: sqlx::Error) -> Self {
        Error::Database {
            operation,
            entity: entity.into(),
            source,
        }
    }
}
