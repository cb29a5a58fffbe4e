//! Migration-specific error types.

use thiserror::Error;

use super::state::MigrationPhase;
use crate::error::StorageError;

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A migration's `migrate` step failed.
    #[error("migration {name} to version {version} failed: {reason}")]
    Failed {
        /// The version the migration upgrades to.
        version: u32,
        /// The migration name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// The store was written by a newer schema than the one declared.
    #[error("schema version {on_disk} on disk is newer than declared version {declared}")]
    Downgrade {
        /// Version recorded in the store.
        on_disk: u32,
        /// Version declared for the database.
        declared: u32,
    },

    /// The pipeline state machine was driven out of order.
    #[error("invalid migration phase transition from {from} to {to}")]
    InvalidTransition {
        /// Current phase.
        from: MigrationPhase,
        /// Requested phase.
        to: MigrationPhase,
    },

    /// Storage error while migrating.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Any other failure raised by a migration.
    #[error("{0}")]
    Custom(String),
}

impl MigrationError {
    /// Create a custom error, for use inside `Migration::migrate`.
    pub fn custom(message: impl Into<String>) -> Self {
        MigrationError::Custom(message.into())
    }
}

impl From<rusqlite::Error> for MigrationError {
    fn from(e: rusqlite::Error) -> Self {
        MigrationError::Storage(StorageError::Sqlite(e))
    }
}
