//! Record persistence over a storage engine.

use tracing::debug;

use crate::adapter::{is_unset, statement, ModelBinding, Predicate};
use crate::error::Error;
use crate::record::Model;
use crate::storage::StorageEngine;
use crate::value::{Row, Value};

/// How a record is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersistMode {
    /// Insert a new row.
    Insert,
    /// Update the row matching the record's key.
    Update,
    /// Update when the keyed row exists, insert otherwise.
    #[default]
    Save,
    /// Delete the row matching the record's key.
    Delete,
}

/// What a persist call did.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOutcome {
    /// A row was inserted.
    Inserted {
        /// The row's key. Store-assigned keys are reported here.
        key: Option<Value>,
    },
    /// Rows were updated.
    Updated {
        /// Number of rows changed.
        rows: u64,
    },
    /// Rows were deleted.
    Deleted {
        /// Number of rows removed.
        rows: u64,
    },
    /// Nothing matched, nothing changed.
    Unchanged,
}

impl PersistOutcome {
    /// The key of an inserted row.
    pub fn inserted_key(&self) -> Option<&Value> {
        match self {
            PersistOutcome::Inserted { key } => key.as_ref(),
            _ => None,
        }
    }

    /// Check if the store was modified.
    pub fn is_changed(&self) -> bool {
        !matches!(self, PersistOutcome::Unchanged)
    }
}

/// Persist a typed record.
pub fn persist<M: Model>(
    binding: &ModelBinding<M>,
    storage: &dyn StorageEngine,
    record: &M,
    mode: PersistMode,
) -> Result<PersistOutcome, Error> {
    binding.ensure_writable()?;
    let row = binding.write(record)?;

    let outcome = match mode {
        PersistMode::Insert => insert(binding, storage, &row)?,
        PersistMode::Update => update(binding, storage, &row)?,
        PersistMode::Save => save(binding, storage, &row)?,
        PersistMode::Delete => delete(binding, storage, &row)?,
    };

    debug!(
        table = %binding.table_name(),
        mode = ?mode,
        outcome = ?outcome,
        "persisted record"
    );
    Ok(outcome)
}

/// Check if a row with the record's key exists.
///
/// A record whose key is unset does not exist.
pub fn exists<M: Model>(
    binding: &ModelBinding<M>,
    storage: &dyn StorageEngine,
    record: &M,
) -> Result<bool, Error> {
    let row = binding.write(record)?;
    match binding.key_predicate(&row) {
        Ok(predicate) => row_exists(binding, storage, &predicate),
        Err(Error::MissingKey { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Read records, optionally filtered by a predicate over stored values.
pub fn fetch<M: Model>(
    binding: &ModelBinding<M>,
    storage: &dyn StorageEngine,
    predicate: Option<&Predicate>,
) -> Result<Vec<M>, Error> {
    let stmt = statement::select(&binding.source_clause(), predicate);
    storage
        .query(&stmt.sql, &stmt.params)?
        .into_iter()
        .map(|row| binding.read(row))
        .collect()
}

fn row_exists<M: Model>(
    binding: &ModelBinding<M>,
    storage: &dyn StorageEngine,
    predicate: &Predicate,
) -> Result<bool, Error> {
    let stmt = statement::exists(&binding.source_clause(), predicate);
    Ok(!storage.query(&stmt.sql, &stmt.params)?.is_empty())
}

fn insert<M: Model>(
    binding: &ModelBinding<M>,
    storage: &dyn StorageEngine,
    row: &Row,
) -> Result<PersistOutcome, Error> {
    let assigned = binding
        .auto_increment_column()
        .filter(|column| is_unset(column, row.get(&column.name).unwrap_or(&Value::Null)));
    let stmt = statement::insert(
        binding.table_name(),
        row,
        binding.columns(),
        assigned.map(|c| c.name.as_str()),
    );
    let result = storage.execute(&stmt.sql, &stmt.params)?;

    let key = match assigned {
        Some(_) => result.last_insert_id.map(Value::Int64),
        None => key_of(binding, row),
    };
    Ok(PersistOutcome::Inserted { key })
}

fn update<M: Model>(
    binding: &ModelBinding<M>,
    storage: &dyn StorageEngine,
    row: &Row,
) -> Result<PersistOutcome, Error> {
    let predicate = binding.key_predicate(row)?;
    let Some(stmt) = statement::update(binding.table_name(), row, binding.columns(), &predicate)
    else {
        // Every column is part of the key; there is nothing to change.
        return Ok(PersistOutcome::Unchanged);
    };

    let result = storage.execute(&stmt.sql, &stmt.params)?;
    if result.rows_affected == 0 {
        Ok(PersistOutcome::Unchanged)
    } else {
        Ok(PersistOutcome::Updated {
            rows: result.rows_affected,
        })
    }
}

fn save<M: Model>(
    binding: &ModelBinding<M>,
    storage: &dyn StorageEngine,
    row: &Row,
) -> Result<PersistOutcome, Error> {
    if let Err(e) = binding.key_predicate(row) {
        return match e {
            Error::MissingKey { .. } => insert(binding, storage, row),
            e => Err(e),
        };
    }

    // Insert-if-absent first: each statement is atomic in the store, so two
    // writers of the same key end as one insert and one update.
    let stmt = statement::insert_absent(binding.table_name(), row, binding.columns());
    if storage.execute(&stmt.sql, &stmt.params)?.rows_affected > 0 {
        return Ok(PersistOutcome::Inserted {
            key: key_of(binding, row),
        });
    }

    match update(binding, storage, row)? {
        // The row exists but every column is key: still a successful save.
        PersistOutcome::Unchanged => Ok(PersistOutcome::Updated { rows: 0 }),
        outcome => Ok(outcome),
    }
}

fn delete<M: Model>(
    binding: &ModelBinding<M>,
    storage: &dyn StorageEngine,
    row: &Row,
) -> Result<PersistOutcome, Error> {
    let predicate = binding.key_predicate(row)?;
    let stmt = statement::delete(binding.table_name(), &predicate);
    match storage.execute(&stmt.sql, &stmt.params)?.rows_affected {
        0 => Ok(PersistOutcome::Unchanged),
        rows => Ok(PersistOutcome::Deleted { rows }),
    }
}

/// The record's key as reported in an insert outcome.
fn key_of<M: Model>(binding: &ModelBinding<M>, row: &Row) -> Option<Value> {
    let mut values: Vec<Value> = binding
        .primary_key_columns()
        .map(|c| row.get(&c.name).cloned().unwrap_or(Value::Null))
        .collect();
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(Value::List(values)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adapter::{AdapterShape, ColumnDef, ModelAdapter, ScalarKind};
    use crate::converter::TypeConverters;
    use crate::storage::SqliteStorage;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Task {
        id: i64,
        title: String,
        done: bool,
    }
    impl Model for Task {}

    struct TaskAdapter {
        columns: Vec<ColumnDef>,
        shape: AdapterShape,
    }

    impl TaskAdapter {
        fn table() -> Self {
            Self {
                columns: vec![
                    ColumnDef::new("id", ScalarKind::Int64).with_auto_increment(),
                    ColumnDef::new("title", ScalarKind::String),
                    ColumnDef::new("done", ScalarKind::Bool),
                ],
                shape: AdapterShape::Table,
            }
        }
    }

    impl ModelAdapter for TaskAdapter {
        type Record = Task;

        fn table_name(&self) -> &str {
            "tasks"
        }

        fn shape(&self) -> AdapterShape {
            self.shape.clone()
        }

        fn columns(&self) -> &[ColumnDef] {
            &self.columns
        }

        fn load(&self, mut row: Row) -> Result<Task, Error> {
            Ok(Task {
                id: row.take("id").as_i64().unwrap_or_default(),
                title: row.take("title").as_str().unwrap_or_default().to_string(),
                done: row.take("done").as_bool().unwrap_or_default(),
            })
        }

        fn store(&self, record: &Task) -> Row {
            Row::new()
                .with("id", record.id)
                .with("title", record.title.as_str())
                .with("done", record.done)
        }
    }

    fn setup() -> (ModelBinding<Task>, SqliteStorage) {
        let binding =
            ModelBinding::new(Arc::new(TaskAdapter::table()), Arc::new(TypeConverters::new()))
                .unwrap();
        let storage = SqliteStorage::in_memory().unwrap();
        storage
            .execute_raw(&binding.creation_statement().unwrap())
            .unwrap();
        (binding, storage)
    }

    fn task(id: i64, title: &str) -> Task {
        Task {
            id,
            title: title.to_string(),
            done: false,
        }
    }

    #[test]
    fn test_insert_assigns_key() {
        let (binding, storage) = setup();
        let outcome = persist(&binding, &storage, &task(0, "write"), PersistMode::Insert).unwrap();
        assert_eq!(outcome.inserted_key(), Some(&Value::Int64(1)));

        let outcome = persist(&binding, &storage, &task(0, "read"), PersistMode::Save).unwrap();
        assert_eq!(outcome.inserted_key(), Some(&Value::Int64(2)));

        let all = fetch(&binding, &storage, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "write");
    }

    #[test]
    fn test_save_updates_existing() {
        let (binding, storage) = setup();
        persist(&binding, &storage, &task(0, "draft"), PersistMode::Insert).unwrap();

        let mut updated = task(1, "final");
        updated.done = true;
        let outcome = persist(&binding, &storage, &updated, PersistMode::Save).unwrap();
        assert_eq!(outcome, PersistOutcome::Updated { rows: 1 });

        let found = fetch(&binding, &storage, Some(&Predicate::eq("id", 1i64))).unwrap();
        assert_eq!(found, vec![updated]);
    }

    #[test]
    fn test_save_with_explicit_key_inserts() {
        let (binding, storage) = setup();
        let outcome = persist(&binding, &storage, &task(42, "pinned"), PersistMode::Save).unwrap();
        assert_eq!(outcome.inserted_key(), Some(&Value::Int64(42)));
        assert!(exists(&binding, &storage, &task(42, "")).unwrap());
    }

    #[test]
    fn test_save_same_key_from_two_threads() {
        let (binding, storage) = setup();
        let barrier = std::sync::Barrier::new(2);

        std::thread::scope(|s| {
            for writer in ["left", "right"] {
                let (binding, storage, barrier) = (&binding, &storage, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    for id in 1..=200 {
                        persist(binding, storage, &task(id, writer), PersistMode::Save).unwrap();
                    }
                });
            }
        });

        let all = fetch(&binding, &storage, None).unwrap();
        assert_eq!(all.len(), 200);
    }

    #[test]
    fn test_save_existing_all_key_row() {
        let adapter = TaskAdapter {
            columns: vec![ColumnDef::new("id", ScalarKind::Int64).with_primary_key()],
            shape: AdapterShape::Table,
        };
        let binding = ModelBinding::new(Arc::new(adapter), Arc::new(TypeConverters::new())).unwrap();
        let storage = SqliteStorage::in_memory().unwrap();
        storage
            .execute_raw(&binding.creation_statement().unwrap())
            .unwrap();

        let outcome = persist(&binding, &storage, &task(3, ""), PersistMode::Save).unwrap();
        assert_eq!(outcome.inserted_key(), Some(&Value::Int64(3)));
        let outcome = persist(&binding, &storage, &task(3, ""), PersistMode::Save).unwrap();
        assert_eq!(outcome, PersistOutcome::Updated { rows: 0 });
    }

    #[test]
    fn test_update_and_delete_require_key() {
        let (binding, storage) = setup();
        let err = persist(&binding, &storage, &task(0, "x"), PersistMode::Update).unwrap_err();
        assert!(matches!(err, Error::MissingKey { .. }));
        let err = persist(&binding, &storage, &task(0, "x"), PersistMode::Delete).unwrap_err();
        assert!(matches!(err, Error::MissingKey { .. }));
    }

    #[test]
    fn test_delete_missing_is_unchanged() {
        let (binding, storage) = setup();
        persist(&binding, &storage, &task(0, "keep"), PersistMode::Insert).unwrap();

        let outcome = persist(&binding, &storage, &task(7, ""), PersistMode::Delete).unwrap();
        assert_eq!(outcome, PersistOutcome::Unchanged);
        assert!(!outcome.is_changed());

        let outcome = persist(&binding, &storage, &task(1, ""), PersistMode::Delete).unwrap();
        assert_eq!(outcome, PersistOutcome::Deleted { rows: 1 });
        assert!(fetch(&binding, &storage, None).unwrap().is_empty());
    }

    #[test]
    fn test_exists_with_unset_key() {
        let (binding, storage) = setup();
        assert!(!exists(&binding, &storage, &task(0, "")).unwrap());
    }

    #[test]
    fn test_view_is_read_only() {
        let adapter = TaskAdapter {
            shape: AdapterShape::View {
                query: "SELECT * FROM tasks WHERE done = 1".into(),
            },
            ..TaskAdapter::table()
        };
        let binding = ModelBinding::new(Arc::new(adapter), Arc::new(TypeConverters::new())).unwrap();
        let storage = SqliteStorage::in_memory().unwrap();

        let err = persist(&binding, &storage, &task(1, "x"), PersistMode::Save).unwrap_err();
        assert!(matches!(err, Error::ReadOnly(_)));
    }
}
