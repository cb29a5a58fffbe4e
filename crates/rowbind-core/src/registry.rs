//! Database registry.
//!
//! The registry maps every record type to the database that owns it. It is
//! built from an explicit list of [`DatabaseDeclaration`]s and initialized
//! lazily: the first lookup (or an explicit [`Registry::ensure_initialized`])
//! validates every declaration and then opens every database, running
//! creation statements and migrations. The
//! construction happens exactly once, even under concurrent first access;
//! a failed construction is retried by the next caller.
//!
//! # Example
//!
//! ```ignore
//! let storage = Arc::new(SqliteStorage::open(SqliteConfig::new("app.db"))?);
//! let registry = Registry::builder()
//!     .with_database(
//!         DatabaseDeclaration::new("app", 1, storage)
//!             .with_model(UserAdapter::default())
//!             .with_container(UserContainerAdapter),
//!     )
//!     .build();
//!
//! let user = Container::<User>::from_json(&registry, r#"{"name": "ada"}"#)?;
//! user.save()?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::adapter::{ModelBinding, ShapeKind};
use crate::config::RegistryConfig;
use crate::container::{Container, ContainerBinding, NestedConverter};
use crate::converter::{TypeConverter, TypeConverters};
use crate::database::{DatabaseDeclaration, DatabaseDefinition};
use crate::error::Error;
use crate::record::{Model, RecordType};
use crate::value::DataMap;
use crate::worker::PersistWorker;

/// Builder for a [`Registry`].
pub struct RegistryBuilder {
    config: RegistryConfig,
    declarations: Vec<DatabaseDeclaration>,
    converters: Arc<TypeConverters>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// Create a builder with the built-in type converters.
    pub fn new() -> Self {
        Self {
            config: RegistryConfig::default(),
            declarations: Vec::new(),
            converters: Arc::new(TypeConverters::new()),
        }
    }

    /// Set the registry configuration.
    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a database.
    pub fn with_database(mut self, declaration: DatabaseDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    /// Register a type converter, replacing any previous one for the key.
    pub fn with_converter(
        self,
        type_key: impl Into<String>,
        converter: impl TypeConverter + 'static,
    ) -> Self {
        self.converters.register(type_key, converter);
        self
    }

    /// Replace the converter registry, for example with
    /// [`TypeConverters::empty`].
    pub fn with_converters(mut self, converters: TypeConverters) -> Self {
        self.converters = Arc::new(converters);
        self
    }

    /// Build the registry. No database is opened until first use.
    pub fn build(self) -> Registry {
        Registry {
            inner: Arc::new(RegistryInner {
                config: self.config,
                declarations: self.declarations,
                converters: self.converters,
                state: OnceCell::new(),
                worker: OnceCell::new(),
            }),
        }
    }
}

/// Opened databases, indexed.
struct RegistryState {
    databases: Vec<Arc<DatabaseDefinition>>,
    by_name: HashMap<String, Arc<DatabaseDefinition>>,
    by_type: HashMap<RecordType, Arc<DatabaseDefinition>>,
}

struct RegistryInner {
    config: RegistryConfig,
    declarations: Vec<DatabaseDeclaration>,
    converters: Arc<TypeConverters>,
    state: OnceCell<RegistryState>,
    worker: OnceCell<PersistWorker>,
}

/// Shared handle to the databases of a process.
///
/// Cloning is cheap; clones share the same databases, converters and
/// persistence worker. The worker stops once the last handle is dropped.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Open every database unless that already happened.
    pub fn ensure_initialized(&self) -> Result<(), Error> {
        self.state().map(|_| ())
    }

    /// Check if the databases have been opened.
    pub fn is_initialized(&self) -> bool {
        self.inner.state.get().is_some()
    }

    fn state(&self) -> Result<&RegistryState, Error> {
        self.inner.state.get_or_try_init(|| self.construct())
    }

    fn construct(&self) -> Result<RegistryState, Error> {
        let mut state = RegistryState {
            databases: Vec::new(),
            by_name: HashMap::new(),
            by_type: HashMap::new(),
        };

        // Build and check every declaration before any store is touched, so a
        // conflicting claim leaves all stores as they were.
        let mut built: Vec<DatabaseDefinition> = Vec::new();
        let mut owners: HashMap<RecordType, usize> = HashMap::new();
        for declaration in &self.inner.declarations {
            if built.iter().any(|d| d.name() == declaration.name()) {
                return Err(Error::InvalidDeclaration(format!(
                    "database {} is declared more than once",
                    declaration.name()
                )));
            }

            let definition = DatabaseDefinition::build(declaration, &self.inner.converters)?;
            for record_type in definition.record_types() {
                if let Some(&first) = owners.get(&record_type) {
                    return Err(Error::DuplicateRegistration {
                        record_type: record_type.to_string(),
                        first: built[first].name().to_string(),
                        second: definition.name().to_string(),
                    });
                }
                owners.insert(record_type, built.len());
            }
            built.push(definition);
        }

        for mut definition in built {
            definition.bring_up_to_date(self.inner.config.log_statements)?;
            debug!(
                database = %definition.name(),
                version = definition.version(),
                "opened database"
            );

            let definition = Arc::new(definition);
            for record_type in definition.record_types() {
                state.by_type.insert(record_type, Arc::clone(&definition));
            }
            state
                .by_name
                .insert(definition.name().to_string(), Arc::clone(&definition));
            state.databases.push(definition);
        }

        info!(
            databases = state.databases.len(),
            record_types = state.by_type.len(),
            "initialized registry"
        );
        Ok(state)
    }

    /// The database that owns a record type.
    pub fn resolve_by_type(&self, record_type: RecordType) -> Result<Arc<DatabaseDefinition>, Error> {
        self.state()?
            .by_type
            .get(&record_type)
            .cloned()
            .ok_or_else(|| Error::UnregisteredType(record_type.to_string()))
    }

    /// The database that owns `M`.
    pub fn resolve_database_for<M: Model>(&self) -> Result<Arc<DatabaseDefinition>, Error> {
        self.resolve_by_type(RecordType::of::<M>())
    }

    /// A database by name.
    pub fn resolve_by_name(&self, name: &str) -> Result<Arc<DatabaseDefinition>, Error> {
        self.state()?
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDatabase(name.to_string()))
    }

    /// Every database, in declaration order.
    pub fn databases(&self) -> Result<Vec<Arc<DatabaseDefinition>>, Error> {
        Ok(self.state()?.databases.clone())
    }

    /// The table adapter of `M`.
    pub fn model_adapter<M: Model>(&self) -> Result<Arc<ModelBinding<M>>, Error> {
        self.resolve_database_for::<M>()?
            .model_adapter::<M>()
            .ok_or_else(|| missing_model::<M>(ShapeKind::Table))
    }

    /// The view adapter of `M`.
    pub fn view_adapter<M: Model>(&self) -> Result<Arc<ModelBinding<M>>, Error> {
        self.resolve_database_for::<M>()?
            .view_adapter::<M>()
            .ok_or_else(|| missing_model::<M>(ShapeKind::View))
    }

    /// The join adapter of `M`.
    pub fn join_adapter<M: Model>(&self) -> Result<Arc<ModelBinding<M>>, Error> {
        self.resolve_database_for::<M>()?
            .join_adapter::<M>()
            .ok_or_else(|| missing_model::<M>(ShapeKind::Join))
    }

    /// The container adapter of `M`. `None` when the type never opted in.
    pub fn container_adapter<M: Model>(&self) -> Result<Option<Arc<ContainerBinding<M>>>, Error> {
        Ok(self.resolve_database_for::<M>()?.container_adapter::<M>())
    }

    /// The table name of `M`, or its view or join name.
    pub fn table_name<M: Model>(&self) -> Result<String, Error> {
        let record_type = RecordType::of::<M>();
        self.resolve_by_type(record_type)?
            .table_name(&record_type)
            .map(str::to_string)
            .ok_or_else(|| missing_model::<M>(ShapeKind::Table))
    }

    /// The type converter registry.
    pub fn converters(&self) -> &Arc<TypeConverters> {
        &self.inner.converters
    }

    /// Wrap data in a container for `M`.
    pub fn container<M: Model>(&self, data: DataMap) -> Result<Container<M>, Error> {
        Container::new(self, data)
    }

    pub(crate) fn nested_converter(
        &self,
        record_type: RecordType,
    ) -> Result<Option<Arc<dyn NestedConverter>>, Error> {
        Ok(self.resolve_by_type(record_type)?.nested_converter(&record_type))
    }

    /// The persistence worker, started on first use.
    pub(crate) fn worker(&self) -> Result<&PersistWorker, Error> {
        self.inner
            .worker
            .get_or_try_init(|| PersistWorker::start(&self.inner.config.worker_thread_name))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("databases", &self.inner.declarations.len())
            .field("initialized", &self.is_initialized())
            .field("converters", &self.inner.converters)
            .finish()
    }
}

fn missing_model<M: Model>(shape: ShapeKind) -> Error {
    Error::MissingModelAdapter {
        record_type: RecordType::of::<M>().to_string(),
        shape: shape.name(),
    }
}
