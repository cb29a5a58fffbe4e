//! Dynamic containers over typed records.
//!
//! A [`Container`] wraps loosely-typed data (a [`DataMap`], typically parsed
//! from JSON) for a record type that opted into container support. It
//! converts the data into the typed record on demand, caches the result, and
//! forwards persistence to the record type's [`ContainerBinding`].

mod adapter;

pub use adapter::{
    ContainerAdapter, ContainerBinding, ContainerColumn, ContainerColumnKind, ResolvedColumns,
};

pub(crate) use adapter::NestedConverter;

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::Error;
use crate::persist::{PersistMode, PersistOutcome};
use crate::record::{Model, RecordType};
use crate::registry::Registry;
use crate::value::{DataMap, Value};
use crate::worker::PersistHandle;

/// Dynamic data for a record of type `M`.
pub struct Container<M: Model> {
    binding: Arc<ContainerBinding<M>>,
    registry: Registry,
    data: Option<DataMap>,
    record: OnceCell<Arc<M>>,
}

impl<M: Model> Container<M> {
    /// Wrap data for a record of type `M`.
    pub fn new(registry: &Registry, data: DataMap) -> Result<Self, Error> {
        Self::build(registry, Some(data))
    }

    /// Parse a JSON object into a container.
    pub fn from_json(registry: &Registry, json: &str) -> Result<Self, Error> {
        let data = DataMap::from_json_str(json)?;
        Self::new(registry, data)
    }

    /// A container holding the data of an existing record.
    ///
    /// Converting it back yields a record equal to `record`. The data holds
    /// domain values, so converter-backed columns keep their domain form.
    pub fn from_record(registry: &Registry, record: &M) -> Result<Self, Error> {
        let mut container = Self::build(registry, None)?;
        container.data = Some(container.binding.to_data(record));
        Ok(container)
    }

    /// A container without data. Its record is `M::default()`.
    pub fn template(registry: &Registry) -> Result<Self, Error> {
        Self::build(registry, None)
    }

    fn build(registry: &Registry, data: Option<DataMap>) -> Result<Self, Error> {
        let binding =
            registry
                .container_adapter::<M>()?
                .ok_or_else(|| Error::MissingContainerAdapter {
                    record_type: RecordType::of::<M>().to_string(),
                })?;

        Ok(Self {
            binding,
            registry: registry.clone(),
            data,
            record: OnceCell::new(),
        })
    }

    /// The wrapped record type.
    pub fn record_type(&self) -> RecordType {
        self.binding.record_type()
    }

    /// The raw data, if any.
    pub fn data(&self) -> Option<&DataMap> {
        self.data.as_ref()
    }

    /// The typed record, converted on first call and cached after that.
    pub fn as_record(&self) -> Result<Arc<M>, Error> {
        self.record
            .get_or_try_init(|| match &self.data {
                Some(data) => self.binding.to_record(data, &self.registry).map(Arc::new),
                None => Ok(Arc::new(M::default())),
            })
            .cloned()
    }

    /// Check if the typed record has been computed.
    pub fn is_cached(&self) -> bool {
        self.record.get().is_some()
    }

    /// Drop the cached record so the next `as_record` converts again.
    pub fn invalidate(&mut self) {
        self.record.take();
    }

    /// A raw column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|d| d.get(column))
    }

    /// Set a raw column value, returning the previous one.
    ///
    /// The cached record is left alone; call [`invalidate`](Self::invalidate)
    /// to pick up the change.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.data
            .get_or_insert_with(DataMap::new)
            .insert(column, value)
    }

    /// Replace the whole data map, returning the previous one.
    ///
    /// Like [`set`](Self::set), this leaves the cached record alone.
    pub fn set_data(&mut self, data: DataMap) -> Option<DataMap> {
        self.data.replace(data)
    }

    /// Insert or update the record.
    pub fn save(&self) -> Result<PersistOutcome, Error> {
        self.persist(PersistMode::Save)
    }

    /// Insert the record.
    pub fn insert(&self) -> Result<PersistOutcome, Error> {
        self.persist(PersistMode::Insert)
    }

    /// Update the record.
    pub fn update(&self) -> Result<PersistOutcome, Error> {
        self.persist(PersistMode::Update)
    }

    /// Delete the record. Deleting a missing row is [`PersistOutcome::Unchanged`].
    pub fn delete(&self) -> Result<PersistOutcome, Error> {
        self.persist(PersistMode::Delete)
    }

    /// Check if the keyed row exists.
    pub fn exists(&self) -> Result<bool, Error> {
        self.binding.exists(self.data_or_empty(), &self.registry)
    }

    /// Persist with an explicit mode.
    pub fn persist(&self, mode: PersistMode) -> Result<PersistOutcome, Error> {
        self.binding
            .persist(self.data_or_empty(), &self.registry, mode)
    }

    /// [`save`](Self::save) on the background worker.
    pub fn save_async(&self) -> PersistHandle<PersistOutcome> {
        self.persist_async(PersistMode::Save)
    }

    /// [`insert`](Self::insert) on the background worker.
    pub fn insert_async(&self) -> PersistHandle<PersistOutcome> {
        self.persist_async(PersistMode::Insert)
    }

    /// [`update`](Self::update) on the background worker.
    pub fn update_async(&self) -> PersistHandle<PersistOutcome> {
        self.persist_async(PersistMode::Update)
    }

    /// [`delete`](Self::delete) on the background worker.
    pub fn delete_async(&self) -> PersistHandle<PersistOutcome> {
        self.persist_async(PersistMode::Delete)
    }

    /// Persist on the background worker with an explicit mode.
    ///
    /// The data is snapshotted now; later `set` calls do not affect the job.
    pub fn persist_async(&self, mode: PersistMode) -> PersistHandle<PersistOutcome> {
        let worker = match self.registry.worker() {
            Ok(worker) => worker,
            Err(e) => return PersistHandle::ready(Err(e)),
        };

        let binding = Arc::clone(&self.binding);
        let registry = self.registry.clone();
        let data = self.data_or_empty().clone();
        worker.submit(move || binding.persist(&data, &registry, mode))
    }

    fn data_or_empty(&self) -> &DataMap {
        static EMPTY: once_cell::sync::Lazy<DataMap> = once_cell::sync::Lazy::new(DataMap::new);
        self.data.as_ref().unwrap_or(&EMPTY)
    }
}

impl<M: Model> std::fmt::Debug for Container<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("record_type", &self.record_type())
            .field("data", &self.data)
            .field("cached", &self.is_cached())
            .finish()
    }
}
