//! SQLite storage engine.

use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, trace};

use super::{ExecuteResult, SqliteConfig, StorageEngine};
use crate::error::StorageError;
use crate::value::{Row, Value};

/// Schema version pragma maintained by SQLite in the database header.
const USER_VERSION: &str = "user_version";

/// Storage engine over a single SQLite connection.
///
/// The connection is shared behind a mutex; statements from different
/// threads are serialized.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    config: SqliteConfig,
}

impl SqliteStorage {
    /// Open or create a database with the given configuration.
    pub fn open(config: SqliteConfig) -> Result<Self, StorageError> {
        let conn = match &config.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };

        conn.busy_timeout(config.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
        if config.wal && !config.is_in_memory() {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!(journal_mode = %mode, "configured journal mode");
        }

        debug!(path = ?config.path, "opened sqlite storage");
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::open(SqliteConfig::in_memory())
    }

    /// The configuration this engine was opened with.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }
}

impl StorageEngine for SqliteStorage {
    fn schema_version(&self) -> Result<u32, StorageError> {
        let conn = self.conn.lock();
        let version: i64 = conn.pragma_query_value(None, USER_VERSION, |row| row.get(0))?;
        u32::try_from(version)
            .map_err(|_| StorageError::Backend(format!("invalid schema version {}", version)))
    }

    fn report_schema_version(&self, version: u32) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.pragma_update(None, USER_VERSION, i64::from(version))?;
        debug!(version, "recorded schema version");
        Ok(())
    }

    fn execute_raw(&self, sql: &str) -> Result<(), StorageError> {
        trace!(sql, "execute_raw");
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecuteResult, StorageError> {
        trace!(sql, params = params.len(), "execute");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows_affected = stmt.execute(params_from_iter(params.iter().map(to_sql)))?;

        let last_insert_id = if is_insert(sql) {
            Some(conn.last_insert_rowid())
        } else {
            None
        };

        Ok(ExecuteResult {
            rows_affected: rows_affected as u64,
            last_insert_id,
        })
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StorageError> {
        trace!(sql, params = params.len(), "query");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql)))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut out = Row::new();
            for (i, name) in names.iter().enumerate() {
                let value: SqlValue = row.get(i)?;
                out.insert(name.clone(), from_sql(value));
            }
            result.push(out);
        }
        Ok(result)
    }

    fn begin_transaction(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        if !conn.is_autocommit() {
            return Err(StorageError::Transaction(
                "a transaction is already open".to_string(),
            ));
        }
        conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        if conn.is_autocommit() {
            return Err(StorageError::Transaction("no open transaction".to_string()));
        }
        conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        if conn.is_autocommit() {
            return Err(StorageError::Transaction("no open transaction".to_string()));
        }
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("config", &self.config)
            .finish()
    }
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .map(|head| head.eq_ignore_ascii_case("insert"))
        .unwrap_or(false)
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int32(i) => SqlValue::Integer(i64::from(*i)),
        Value::Int64(i) | Value::Timestamp(i) => SqlValue::Integer(*i),
        Value::Float64(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Uuid(u) => SqlValue::Blob(u.to_vec()),
        Value::List(_) | Value::Map(_) => SqlValue::Text(value.to_json().to_string()),
    }
}

fn from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Int64(i),
        SqlValue::Real(f) => Value::Float64(f),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::Bytes(b),
    }
}
