//! Storage collaborator.
//!
//! The binding runtime never talks SQL to a driver directly; it goes through
//! [`StorageEngine`], which exposes statement execution, a schema version
//! counter and explicit transactions. [`SqliteStorage`] is the bundled
//! implementation.

mod config;
mod sqlite;

pub use config::SqliteConfig;
pub use sqlite::SqliteStorage;

use tracing::warn;

use crate::error::StorageError;
use crate::value::{Row, Value};

/// Outcome of a data-modifying statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteResult {
    /// Rows inserted, updated or deleted.
    pub rows_affected: u64,
    /// Row id assigned by an `INSERT`, if the statement was one.
    pub last_insert_id: Option<i64>,
}

/// A relational store the runtime persists through.
pub trait StorageEngine: Send + Sync {
    /// The schema version recorded in the store. 0 means never initialized.
    fn schema_version(&self) -> Result<u32, StorageError>;

    /// Record a new schema version.
    fn report_schema_version(&self, version: u32) -> Result<(), StorageError>;

    /// Execute one or more statements without parameters.
    fn execute_raw(&self, sql: &str) -> Result<(), StorageError>;

    /// Execute a single parameterized statement.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecuteResult, StorageError>;

    /// Run a query and collect its rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StorageError>;

    /// Start a transaction.
    fn begin_transaction(&self) -> Result<(), StorageError>;

    /// Commit the open transaction.
    fn commit(&self) -> Result<(), StorageError>;

    /// Roll back the open transaction.
    fn rollback(&self) -> Result<(), StorageError>;
}

/// Run `f` inside a transaction, committing on success and rolling back on
/// error.
pub fn with_transaction<T, E, F>(storage: &dyn StorageEngine, f: F) -> Result<T, E>
where
    E: From<StorageError>,
    F: FnOnce(&dyn StorageEngine) -> Result<T, E>,
{
    storage.begin_transaction()?;
    match f(storage) {
        Ok(value) => {
            storage.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = storage.rollback() {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
