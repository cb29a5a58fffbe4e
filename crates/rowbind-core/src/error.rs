//! Core error types.

use thiserror::Error;

use crate::migration::MigrationError;

/// Storage collaborator errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite driver error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Transaction misuse (commit without begin, nested begin).
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Binding runtime errors.
#[derive(Debug, Error)]
pub enum Error {
    /// No database claims the record type.
    #[error("record type {0} is not registered with any database")]
    UnregisteredType(String),

    /// No database with this name.
    #[error("unknown database: {0}")]
    UnknownDatabase(String),

    /// The record type never opted into container support.
    #[error("record type {record_type} has no container adapter")]
    MissingContainerAdapter {
        /// The record type.
        record_type: String,
    },

    /// A nested record column points at a type without container adapter.
    #[error("column {column} of {record_type} holds {nested_type}, which has no container adapter")]
    MissingAdapter {
        /// The record type being converted.
        record_type: String,
        /// The offending column.
        column: String,
        /// The nested record type.
        nested_type: String,
    },

    /// The record type is registered, but not with the requested shape.
    #[error("record type {record_type} has no {shape} adapter")]
    MissingModelAdapter {
        /// The record type.
        record_type: String,
        /// The requested shape ("table", "view" or "join").
        shape: &'static str,
    },

    /// A record type is claimed by two databases.
    #[error("record type {record_type} is registered in both {first} and {second}")]
    DuplicateRegistration {
        /// The record type.
        record_type: String,
        /// First claiming database.
        first: String,
        /// Second claiming database.
        second: String,
    },

    /// A declaration is malformed.
    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// A primary key column is unset where a key is required.
    #[error("primary key column {column} of {record_type} is unset")]
    MissingKey {
        /// The record type.
        record_type: String,
        /// The unset key column.
        column: String,
    },

    /// A value has the wrong kind for its column.
    #[error("type mismatch for column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The column.
        column: String,
        /// The expected kind.
        expected: String,
        /// The kind that was found.
        found: String,
    },

    /// Attempted to write through a view or join.
    #[error("{0} is read-only")]
    ReadOnly(String),

    /// A type converter rejected a value.
    #[error("conversion error: {0}")]
    Conversion(#[from] crate::converter::ConversionError),

    /// Malformed input data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Storage collaborator error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Migration pipeline error.
    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),

    /// The background persistence worker is gone.
    #[error("persistence worker is not running")]
    WorkerUnavailable,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Registration or build mistakes. Never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnregisteredType(_)
                | Error::UnknownDatabase(_)
                | Error::MissingContainerAdapter { .. }
                | Error::MissingAdapter { .. }
                | Error::MissingModelAdapter { .. }
                | Error::DuplicateRegistration { .. }
                | Error::InvalidDeclaration(_)
        )
    }

    /// Data that does not satisfy the schema at operation time.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Error::MissingKey { .. } | Error::TypeMismatch { .. } | Error::ReadOnly(_)
        ) || matches!(self, Error::Migration(MigrationError::Downgrade { .. }))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(StorageError::Sqlite(e))
    }
}
