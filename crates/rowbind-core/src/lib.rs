//! rowbind core: typed records over a relational store.
//!
//! This crate binds application record types to tables, views and joins,
//! converts loosely-typed data into typed records through containers, and
//! keeps each database's schema at its declared version with an ordered
//! migration pipeline.

pub mod adapter;
pub mod config;
pub mod container;
pub mod converter;
pub mod database;
pub mod error;
pub mod migration;
pub mod persist;
pub mod record;
pub mod registry;
pub mod storage;
pub mod value;
pub mod worker;

pub use adapter::{
    AdapterShape, ColumnDef, ColumnType, ModelAdapter, ModelBinding, Predicate, ScalarKind,
    ShapeKind,
};
pub use config::RegistryConfig;
pub use container::{
    Container, ContainerAdapter, ContainerBinding, ContainerColumn, ContainerColumnKind,
    ResolvedColumns,
};
pub use converter::{
    BooleanConverter, ConversionError, TimestampConverter, TypeConverter, TypeConverters,
    UuidConverter,
};
pub use database::{DatabaseDeclaration, DatabaseDefinition, DatabaseListener};
pub use error::{Error, StorageError};
pub use migration::{
    Migration, MigrationError, MigrationPhase, MigrationPipeline, MigrationReport, MigrationState,
};
pub use persist::{PersistMode, PersistOutcome};
pub use record::{Model, RecordType};
pub use registry::{Registry, RegistryBuilder};
pub use storage::{with_transaction, ExecuteResult, SqliteConfig, SqliteStorage, StorageEngine};
pub use value::{DataMap, Row, Value};
pub use worker::{PersistHandle, PersistWorker};
