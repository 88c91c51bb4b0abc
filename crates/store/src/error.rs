//! Error types for the store crate.

use proximity_core::{Error, ErrorCode};
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by a [`DistanceStore`](crate::DistanceStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be reached
    #[error("Failed to connect to database: {0}")]
    Connection(#[source] postgres::Error),

    /// The connection closed and could not be opened again
    #[error("Lost the database connection: {0}")]
    Reconnect(#[source] Error),

    /// The connection closed and the store has no URL to reconnect with
    #[error("Database connection closed")]
    Disconnected,

    /// A statement failed outside of a write transaction
    #[error("Query failed while {operation}: {source}")]
    Query {
        /// What the store was doing
        operation: &'static str,
        /// Driver error
        #[source]
        source: postgres::Error,
    },

    /// A write transaction failed and was rolled back
    #[error("Transaction failed: {0}")]
    Transaction(#[source] postgres::Error),

    /// A row broke a table constraint; the whole batch was rejected
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// Table or column names are not usable
    #[error("Invalid table layout: {0}")]
    Layout(String),

    /// Failure raised on purpose by [`MemoryStore`](crate::MemoryStore)
    #[error("Injected failure: {0}")]
    Injected(String),
}

impl StoreError {
    /// Shorthand for a [`StoreError::Query`].
    pub fn query(operation: &'static str, source: postgres::Error) -> Self {
        StoreError::Query { operation, source }
    }

    /// Error code used when converting into [`proximity_core::Error`].
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::Connection(_) | StoreError::Reconnect(_) | StoreError::Disconnected => {
                ErrorCode::ConnectionFailed
            }
            StoreError::Query { .. } => ErrorCode::QueryFailed,
            StoreError::Transaction(_) => ErrorCode::TransactionFailed,
            StoreError::Constraint(_) => ErrorCode::ConstraintViolation,
            StoreError::Layout(_) => ErrorCode::SchemaError,
            StoreError::Injected(_) => ErrorCode::StorageError,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        let code = err.code();
        let message = err.to_string();
        let error = Error::new(code, message);
        match code {
            ErrorCode::ConnectionFailed => error
                .with_suggestion("Check DATABASE_URL and that PostgreSQL accepts connections")
                .with_source(err),
            _ => error.with_source(err),
        }
    }
}
