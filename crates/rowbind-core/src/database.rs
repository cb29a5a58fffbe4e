//! Database declarations and definitions.
//!
//! A [`DatabaseDeclaration`] is the registration table for one logical
//! database: its adapters, migrations and lifecycle listener. When the
//! registry initializes, every declaration is first built into a
//! [`DatabaseDefinition`] without touching its store. Once every
//! declaration has been built and the record-type claims checked, each
//! definition brings its store up to the declared schema version before it
//! is handed out.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::adapter::{ModelAdapter, ModelBinding, Predicate, ShapeKind};
use crate::container::{ContainerAdapter, ContainerBinding, NestedConverter};
use crate::converter::TypeConverters;
use crate::error::Error;
use crate::migration::{Migration, MigrationError, MigrationPipeline, MigrationReport, MigrationTable};
use crate::persist::{self, PersistMode, PersistOutcome};
use crate::record::{Model, RecordType};
use crate::storage::{with_transaction, StorageEngine};

/// Hooks around opening a database.
///
/// Each hook runs once per definition construction.
pub trait DatabaseListener: Send + Sync {
    /// A fresh store was created. Runs after creation statements, before
    /// migrations.
    fn on_create(&self, _storage: &dyn StorageEngine) -> Result<(), Error> {
        Ok(())
    }

    /// The store is about to be upgraded from `old` to `new`.
    fn on_upgrade(&self, _storage: &dyn StorageEngine, _old: u32, _new: u32) -> Result<(), Error> {
        Ok(())
    }

    /// The store is at the declared version and ready for use.
    fn on_open(&self, _storage: &dyn StorageEngine) -> Result<(), Error> {
        Ok(())
    }
}

/// A model binding with its type erased.
struct ModelEntry {
    record_type: RecordType,
    shape: ShapeKind,
    table_name: String,
    creation: Option<String>,
    binding: Arc<dyn Any + Send + Sync>,
}

/// A container binding with its type erased.
struct ContainerEntry {
    binding: Arc<dyn Any + Send + Sync>,
    nested: Arc<dyn NestedConverter>,
}

type ModelFactory = Arc<dyn Fn(&Arc<TypeConverters>) -> Result<ModelEntry, Error> + Send + Sync>;

type ContainerFactory = Arc<
    dyn Fn(&ModelEntries, &Arc<dyn StorageEngine>) -> Result<(RecordType, ContainerEntry), Error>
        + Send
        + Sync,
>;

/// Model entries of one database, by shape.
#[derive(Default)]
struct ModelEntries {
    tables: HashMap<RecordType, ModelEntry>,
    views: HashMap<RecordType, ModelEntry>,
    joins: HashMap<RecordType, ModelEntry>,
}

impl ModelEntries {
    fn by_shape(&self, shape: ShapeKind) -> &HashMap<RecordType, ModelEntry> {
        match shape {
            ShapeKind::Table => &self.tables,
            ShapeKind::View => &self.views,
            ShapeKind::Join => &self.joins,
        }
    }

    fn by_shape_mut(&mut self, shape: ShapeKind) -> &mut HashMap<RecordType, ModelEntry> {
        match shape {
            ShapeKind::Table => &mut self.tables,
            ShapeKind::View => &mut self.views,
            ShapeKind::Join => &mut self.joins,
        }
    }

    fn typed<M: Model>(&self, shape: ShapeKind) -> Option<Arc<ModelBinding<M>>> {
        self.by_shape(shape)
            .get(&RecordType::of::<M>())
            .and_then(|entry| Arc::clone(&entry.binding).downcast::<ModelBinding<M>>().ok())
    }

    /// The binding of `M`, whatever its shape.
    fn any_shape<M: Model>(&self) -> Option<Arc<ModelBinding<M>>> {
        self.typed::<M>(ShapeKind::Table)
            .or_else(|| self.typed::<M>(ShapeKind::View))
            .or_else(|| self.typed::<M>(ShapeKind::Join))
    }

    fn contains(&self, record_type: &RecordType) -> bool {
        self.tables.contains_key(record_type)
            || self.views.contains_key(record_type)
            || self.joins.contains_key(record_type)
    }
}

/// Registration table for one logical database.
#[derive(Clone)]
pub struct DatabaseDeclaration {
    name: String,
    version: u32,
    storage: Arc<dyn StorageEngine>,
    models: Vec<ModelFactory>,
    containers: Vec<ContainerFactory>,
    migrations: MigrationTable,
    listener: Option<Arc<dyn DatabaseListener>>,
}

impl DatabaseDeclaration {
    /// Declare a database at schema `version` (1 or higher) over `storage`.
    pub fn new(name: impl Into<String>, version: u32, storage: Arc<dyn StorageEngine>) -> Self {
        Self {
            name: name.into(),
            version,
            storage,
            models: Vec::new(),
            containers: Vec::new(),
            migrations: MigrationTable::new(),
            listener: None,
        }
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared schema version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Register a model adapter. Its shape decides whether it is a table,
    /// view or join.
    pub fn with_model<A: ModelAdapter>(self, adapter: A) -> Self {
        self.with_model_arc::<A::Record>(Arc::new(adapter))
    }

    /// Register a shared model adapter.
    pub fn with_model_arc<M: Model>(mut self, adapter: Arc<dyn ModelAdapter<Record = M>>) -> Self {
        self.models.push(Arc::new(
            move |converters: &Arc<TypeConverters>| -> Result<ModelEntry, Error> {
                let binding = ModelBinding::new(Arc::clone(&adapter), Arc::clone(converters))?;
                Ok(ModelEntry {
                    record_type: binding.record_type(),
                    shape: binding.shape().kind(),
                    table_name: binding.table_name().to_string(),
                    creation: binding.creation_statement(),
                    binding: Arc::new(binding),
                })
            },
        ));
        self
    }

    /// Opt a record type into container support.
    ///
    /// The type must also have a model adapter in this database.
    pub fn with_container<A: ContainerAdapter>(self, adapter: A) -> Self {
        self.with_container_arc::<A::Record>(Arc::new(adapter))
    }

    /// Register a shared container adapter.
    pub fn with_container_arc<M: Model>(
        mut self,
        adapter: Arc<dyn ContainerAdapter<Record = M>>,
    ) -> Self {
        self.containers.push(Arc::new(
            move |models: &ModelEntries,
                  storage: &Arc<dyn StorageEngine>|
                  -> Result<(RecordType, ContainerEntry), Error> {
                let record_type = RecordType::of::<M>();
                let model = models
                    .any_shape::<M>()
                    .ok_or_else(|| Error::MissingModelAdapter {
                        record_type: record_type.to_string(),
                        shape: ShapeKind::Table.name(),
                    })?;
                let binding = Arc::new(ContainerBinding::new(
                    Arc::clone(&adapter),
                    model,
                    Arc::clone(storage),
                )?);
                Ok((
                    record_type,
                    ContainerEntry {
                        binding: binding.clone(),
                        nested: binding,
                    },
                ))
            },
        ));
        self
    }

    /// Register a migration that upgrades the schema to `version`.
    ///
    /// Migrations at the same version run in registration order.
    pub fn with_migration(self, version: u32, migration: impl Migration + 'static) -> Self {
        self.with_migration_arc(version, Arc::new(migration))
    }

    /// Register a shared migration.
    pub fn with_migration_arc(mut self, version: u32, migration: Arc<dyn Migration>) -> Self {
        self.migrations.entry(version).or_default().push(migration);
        self
    }

    /// Set the lifecycle listener.
    pub fn with_listener(mut self, listener: impl DatabaseListener + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }
}

impl fmt::Debug for DatabaseDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseDeclaration")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("models", &self.models.len())
            .field("containers", &self.containers.len())
            .field("migrations", &self.migrations.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A database: its bindings, migration table and storage.
pub struct DatabaseDefinition {
    name: String,
    version: u32,
    storage: Arc<dyn StorageEngine>,
    models: ModelEntries,
    containers: HashMap<RecordType, ContainerEntry>,
    migrations: MigrationTable,
    creation: Vec<String>,
    listener: Option<Arc<dyn DatabaseListener>>,
    report: MigrationReport,
}

impl DatabaseDefinition {
    /// Build and validate the bindings of a declaration.
    ///
    /// Nothing is read from or written to the store.
    pub(crate) fn build(
        declaration: &DatabaseDeclaration,
        converters: &Arc<TypeConverters>,
    ) -> Result<Self, Error> {
        if declaration.name.trim().is_empty() {
            return Err(Error::InvalidDeclaration(
                "database name must not be empty".to_string(),
            ));
        }
        if declaration.version == 0 {
            return Err(Error::InvalidDeclaration(format!(
                "database {} must declare a version of 1 or higher",
                declaration.name
            )));
        }

        let mut models = ModelEntries::default();
        let mut creation = Vec::new();
        let mut view_creation = Vec::new();
        for factory in &declaration.models {
            let entry = factory(converters)?;
            if models.contains(&entry.record_type) {
                return Err(Error::InvalidDeclaration(format!(
                    "record type {} has more than one model adapter in database {}",
                    entry.record_type, declaration.name
                )));
            }
            debug!(
                database = %declaration.name,
                record_type = %entry.record_type,
                table = %entry.table_name,
                shape = entry.shape.name(),
                "registered model adapter"
            );

            let statements = match entry.shape {
                ShapeKind::View => &mut view_creation,
                ShapeKind::Table | ShapeKind::Join => &mut creation,
            };
            statements.extend(entry.creation.clone());

            models
                .by_shape_mut(entry.shape)
                .insert(entry.record_type, entry);
        }
        creation.extend(view_creation);

        let mut containers = HashMap::new();
        for factory in &declaration.containers {
            let (record_type, entry) = factory(&models, &declaration.storage)?;
            if containers.insert(record_type, entry).is_some() {
                return Err(Error::InvalidDeclaration(format!(
                    "record type {} has more than one container adapter in database {}",
                    record_type, declaration.name
                )));
            }
            debug!(database = %declaration.name, record_type = %record_type, "registered container adapter");
        }

        Ok(Self {
            name: declaration.name.clone(),
            version: declaration.version,
            storage: Arc::clone(&declaration.storage),
            models,
            containers,
            migrations: declaration.migrations.clone(),
            creation,
            listener: declaration.listener.clone(),
            report: MigrationReport::default(),
        })
    }

    /// Bring the store up to the declared version and record what ran.
    pub(crate) fn bring_up_to_date(&mut self, log_statements: bool) -> Result<(), Error> {
        self.report = self.upgrade(log_statements)?;
        Ok(())
    }

    fn upgrade(&self, log_statements: bool) -> Result<MigrationReport, Error> {
        let storage = self.storage.as_ref();
        let listener = self.listener.as_deref();
        let on_disk = storage.schema_version()?;

        if on_disk > self.version {
            return Err(MigrationError::Downgrade {
                on_disk,
                declared: self.version,
            }
            .into());
        }

        let mut report = MigrationReport {
            from: on_disk,
            to: self.version,
            applied: Vec::new(),
        };

        if on_disk < self.version {
            if on_disk == 0 {
                info!(database = %self.name, version = self.version, "creating database");
            } else {
                info!(
                    database = %self.name,
                    from = on_disk,
                    to = self.version,
                    "upgrading database"
                );
                if let Some(listener) = listener {
                    listener.on_upgrade(storage, on_disk, self.version)?;
                }
            }

            with_transaction(storage, |tx| {
                for sql in &self.creation {
                    if log_statements {
                        debug!(database = %self.name, sql = %sql, "creating schema object");
                    }
                    tx.execute_raw(sql)?;
                }
                Ok::<_, Error>(())
            })?;

            if on_disk == 0 {
                if let Some(listener) = listener {
                    listener.on_create(storage)?;
                }
            }

            report = MigrationPipeline::new(&self.name, &self.migrations).run(
                storage,
                on_disk,
                self.version,
            )?;
            storage.report_schema_version(self.version)?;
        }

        if let Some(listener) = listener {
            listener.on_open(storage)?;
        }
        Ok(report)
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared schema version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The storage engine backing this database.
    pub fn storage(&self) -> &Arc<dyn StorageEngine> {
        &self.storage
    }

    /// Migrations applied when this definition was opened.
    pub fn migration_report(&self) -> &MigrationReport {
        &self.report
    }

    /// The migration table, by target version.
    pub fn migrations(&self) -> &MigrationTable {
        &self.migrations
    }

    /// Every record type this database claims.
    pub fn record_types(&self) -> Vec<RecordType> {
        let mut types: Vec<RecordType> = self
            .models
            .tables
            .keys()
            .chain(self.models.views.keys())
            .chain(self.models.joins.keys())
            .copied()
            .collect();
        for record_type in self.containers.keys() {
            if !types.contains(record_type) {
                types.push(*record_type);
            }
        }
        types
    }

    /// Check if this database claims the record type.
    pub fn contains(&self, record_type: &RecordType) -> bool {
        self.models.contains(record_type) || self.containers.contains_key(record_type)
    }

    /// The table adapter of `M`.
    pub fn model_adapter<M: Model>(&self) -> Option<Arc<ModelBinding<M>>> {
        self.models.typed::<M>(ShapeKind::Table)
    }

    /// The view adapter of `M`.
    pub fn view_adapter<M: Model>(&self) -> Option<Arc<ModelBinding<M>>> {
        self.models.typed::<M>(ShapeKind::View)
    }

    /// The join adapter of `M`.
    pub fn join_adapter<M: Model>(&self) -> Option<Arc<ModelBinding<M>>> {
        self.models.typed::<M>(ShapeKind::Join)
    }

    /// The container adapter of `M`, if the type opted in.
    pub fn container_adapter<M: Model>(&self) -> Option<Arc<ContainerBinding<M>>> {
        self.containers
            .get(&RecordType::of::<M>())
            .and_then(|entry| Arc::clone(&entry.binding).downcast::<ContainerBinding<M>>().ok())
    }

    pub(crate) fn nested_converter(&self, record_type: &RecordType) -> Option<Arc<dyn NestedConverter>> {
        self.containers
            .get(record_type)
            .map(|entry| Arc::clone(&entry.nested))
    }

    /// The table, view or join name of a record type.
    pub fn table_name(&self, record_type: &RecordType) -> Option<&str> {
        self.models
            .tables
            .get(record_type)
            .or_else(|| self.models.views.get(record_type))
            .or_else(|| self.models.joins.get(record_type))
            .map(|entry| entry.table_name.as_str())
    }

    /// Read records of `M` through its table, view or join.
    pub fn fetch<M: Model>(&self, predicate: Option<&Predicate>) -> Result<Vec<M>, Error> {
        let binding = self.binding_for::<M>()?;
        persist::fetch(&binding, self.storage.as_ref(), predicate)
    }

    /// Persist a typed record.
    pub fn persist<M: Model>(&self, record: &M, mode: PersistMode) -> Result<PersistOutcome, Error> {
        let binding = self.binding_for::<M>()?;
        persist::persist(&binding, self.storage.as_ref(), record, mode)
    }

    /// Check if the keyed row of a typed record exists.
    pub fn exists<M: Model>(&self, record: &M) -> Result<bool, Error> {
        let binding = self.binding_for::<M>()?;
        persist::exists(&binding, self.storage.as_ref(), record)
    }

    fn binding_for<M: Model>(&self) -> Result<Arc<ModelBinding<M>>, Error> {
        self.models
            .any_shape::<M>()
            .ok_or_else(|| Error::MissingModelAdapter {
                record_type: RecordType::of::<M>().to_string(),
                shape: "table, view or join",
            })
    }
}

impl fmt::Debug for DatabaseDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseDefinition")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("record_types", &self.record_types())
            .finish()
    }
}
