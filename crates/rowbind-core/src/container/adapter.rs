//! Container adapters: typed records from dynamic data.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::adapter::ModelBinding;
use crate::error::Error;
use crate::persist::{self, PersistMode, PersistOutcome};
use crate::record::{Model, RecordType};
use crate::registry::Registry;
use crate::storage::StorageEngine;
use crate::value::{DataMap, Value};

/// How a container column is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerColumnKind {
    /// The value is handed to the adapter as is.
    Direct,
    /// The value is nested data for another record type, converted through
    /// that type's container adapter.
    Record(RecordType),
}

/// A column a container adapter reads from its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerColumn {
    /// Column name.
    pub name: String,
    /// Resolution rule.
    pub kind: ContainerColumnKind,
}

impl ContainerColumn {
    /// A column passed through verbatim.
    pub fn direct(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ContainerColumnKind::Direct,
        }
    }

    /// A column holding a nested record of type `M`.
    pub fn record<M: Model>(name: impl Into<String>) -> Self {
        Self::record_of(name, RecordType::of::<M>())
    }

    /// A column holding a nested record of the given type.
    pub fn record_of(name: impl Into<String>, record_type: RecordType) -> Self {
        Self {
            name: name.into(),
            kind: ContainerColumnKind::Record(record_type),
        }
    }

    /// The nested record type, for record columns.
    pub fn nested_type(&self) -> Option<RecordType> {
        match self.kind {
            ContainerColumnKind::Record(record_type) => Some(record_type),
            ContainerColumnKind::Direct => None,
        }
    }
}

/// Column values and nested records resolved from container data.
#[derive(Default)]
pub struct ResolvedColumns {
    values: DataMap,
    records: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ResolvedColumns {
    /// A plain value.
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Move a plain value out, `Null` if absent.
    pub fn take_value(&mut self, column: &str) -> Value {
        self.values.take(column)
    }

    /// Move a nested record out. `None` when the data held no record.
    pub fn record<T: Model + Clone>(&mut self, column: &str) -> Result<Option<T>, Error> {
        Ok(self.record_arc::<T>(column)?.map(Arc::unwrap_or_clone))
    }

    /// Move a nested record out without unwrapping its `Arc`.
    pub fn record_arc<T: Model>(&mut self, column: &str) -> Result<Option<Arc<T>>, Error> {
        match self.records.remove(column) {
            None => Ok(None),
            Some(record) => record.downcast::<T>().map(Some).map_err(|_| Error::TypeMismatch {
                column: column.to_string(),
                expected: RecordType::of::<T>().to_string(),
                found: "another record type".to_string(),
            }),
        }
    }

    /// Check if a nested record was resolved for the column.
    pub fn has_record(&self, column: &str) -> bool {
        self.records.contains_key(column)
    }
}

impl std::fmt::Debug for ResolvedColumns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedColumns")
            .field("values", &self.values)
            .field("records", &self.records.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Per-record-type assembly of typed records from container data.
///
/// Implemented by generated code for record types that opt into container
/// support.
pub trait ContainerAdapter: Send + Sync + 'static {
    /// The record type this adapter builds.
    type Record: Model;

    /// Columns read from container data.
    fn columns(&self) -> &[ContainerColumn];

    /// Build a record from resolved columns.
    fn assemble(&self, columns: &mut ResolvedColumns) -> Result<Self::Record, Error>;

    /// Container data describing `record`, such that `assemble` rebuilds it.
    ///
    /// `None` falls back to the model adapter's domain values, which is
    /// enough when every container column is direct. Adapters with record
    /// columns override this to nest the related record's data.
    fn disassemble(&self, _record: &Self::Record) -> Option<DataMap> {
        None
    }
}

/// Conversion of nested data without knowing its record type statically.
pub(crate) trait NestedConverter: Send + Sync {
    fn convert(&self, data: DataMap, registry: &Registry) -> Result<Arc<dyn Any + Send + Sync>, Error>;
}

/// A container adapter bound to its model binding and storage.
pub struct ContainerBinding<M: Model> {
    adapter: Arc<dyn ContainerAdapter<Record = M>>,
    model: Arc<ModelBinding<M>>,
    storage: Arc<dyn StorageEngine>,
    record_type: RecordType,
}

impl<M: Model> ContainerBinding<M> {
    /// Bind a container adapter.
    pub fn new(
        adapter: Arc<dyn ContainerAdapter<Record = M>>,
        model: Arc<ModelBinding<M>>,
        storage: Arc<dyn StorageEngine>,
    ) -> Result<Self, Error> {
        let record_type = RecordType::of::<M>();
        let mut seen = HashSet::new();
        for column in adapter.columns() {
            if column.name.is_empty() || !seen.insert(column.name.as_str()) {
                return Err(Error::InvalidDeclaration(format!(
                    "container adapter for {} declares column {:?} more than once or unnamed",
                    record_type, column.name
                )));
            }
        }

        Ok(Self {
            adapter,
            model,
            storage,
            record_type,
        })
    }

    /// The bound record type.
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// The model binding records are persisted through.
    pub fn model(&self) -> &ModelBinding<M> {
        &self.model
    }

    /// Declared container columns.
    pub fn columns(&self) -> &[ContainerColumn] {
        self.adapter.columns()
    }

    /// Convert container data into a typed record.
    ///
    /// Every record column's adapter is resolved up front, whether or not the
    /// data holds a value for it, so a missing nested adapter is reported
    /// regardless of the data.
    pub fn to_record(&self, data: &DataMap, registry: &Registry) -> Result<M, Error> {
        let mut resolved = ResolvedColumns::default();
        let mut nested = Vec::new();

        for column in self.columns() {
            if let ContainerColumnKind::Record(nested_type) = column.kind {
                let converter = registry.nested_converter(nested_type)?.ok_or_else(|| {
                    Error::MissingAdapter {
                        record_type: self.record_type.to_string(),
                        column: column.name.clone(),
                        nested_type: nested_type.to_string(),
                    }
                })?;
                nested.push((column, converter));
            }
        }

        for (column, value) in data.iter() {
            let is_record = nested.iter().any(|(c, _)| c.name == column);
            if !is_record {
                resolved.values.insert(column, value.clone());
            }
        }

        for (column, converter) in nested {
            match data.get(&column.name) {
                None | Some(Value::Null) => {}
                Some(Value::Map(map)) => {
                    let record = converter.convert(map.clone(), registry)?;
                    resolved.records.insert(column.name.clone(), record);
                }
                Some(other) => {
                    return Err(Error::TypeMismatch {
                        column: column.name.clone(),
                        expected: "map".to_string(),
                        found: other.kind_name().to_string(),
                    })
                }
            }
        }

        self.adapter.assemble(&mut resolved)
    }

    /// Container data for a typed record.
    pub fn to_data(&self, record: &M) -> DataMap {
        self.adapter
            .disassemble(record)
            .unwrap_or_else(|| self.model.domain_row(record))
    }

    /// Persist container data.
    pub fn persist(
        &self,
        data: &DataMap,
        registry: &Registry,
        mode: PersistMode,
    ) -> Result<PersistOutcome, Error> {
        let record = self.to_record(data, registry)?;
        persist::persist(&self.model, self.storage.as_ref(), &record, mode)
    }

    /// Check if a row keyed by the container data exists.
    pub fn exists(&self, data: &DataMap, registry: &Registry) -> Result<bool, Error> {
        let record = self.to_record(data, registry)?;
        persist::exists(&self.model, self.storage.as_ref(), &record)
    }
}

impl<M: Model> NestedConverter for ContainerBinding<M> {
    fn convert(&self, data: DataMap, registry: &Registry) -> Result<Arc<dyn Any + Send + Sync>, Error> {
        let record = self.to_record(&data, registry)?;
        Ok(Arc::new(record))
    }
}

impl<M: Model> std::fmt::Debug for ContainerBinding<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerBinding")
            .field("record_type", &self.record_type)
            .field("columns", &self.columns())
            .finish()
    }
}
