//! Type converters between domain values and their stored form.
//!
//! A column's declared type has a key (`"bool"`, `"timestamp"`, or the name
//! of a custom type). When a converter is registered under that key, model
//! bindings route the column through it on the way to and from storage;
//! otherwise the value is stored verbatim.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::adapter::ScalarKind;
use crate::value::Value;

/// A converter rejected a value.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{type_key}: {reason}")]
pub struct ConversionError {
    /// Key of the converter that failed.
    pub type_key: String,
    /// What went wrong.
    pub reason: String,
}

impl ConversionError {
    /// Create a conversion error.
    pub fn new(type_key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            reason: reason.into(),
        }
    }

    fn unexpected(type_key: &str, expected: &str, found: &Value) -> Self {
        Self::new(
            type_key,
            format!("expected {}, found {}", expected, found.kind_name()),
        )
    }
}

/// Serializes one domain value type for storage and back.
///
/// Converters never see `Value::Null`; nulls pass through untouched.
pub trait TypeConverter: Send + Sync {
    /// The kind of value `to_storage` produces. Drives column affinity.
    fn storage_kind(&self) -> ScalarKind;

    /// Convert a domain value into its stored form.
    fn to_storage(&self, value: Value) -> Result<Value, ConversionError>;

    /// Convert a stored value back into its domain form.
    fn from_storage(&self, value: Value) -> Result<Value, ConversionError>;
}

/// Registry of converters keyed by value type key.
pub struct TypeConverters {
    converters: DashMap<String, Arc<dyn TypeConverter>>,
}

impl TypeConverters {
    /// A registry holding the built-in converters.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register(ScalarKind::Bool.type_key(), BooleanConverter);
        registry.register(ScalarKind::Timestamp.type_key(), TimestampConverter);
        registry.register(ScalarKind::Uuid.type_key(), UuidConverter);
        registry
    }

    /// A registry without any converters.
    pub fn empty() -> Self {
        Self {
            converters: DashMap::new(),
        }
    }

    /// Register a converter, replacing any previous one for the key.
    ///
    /// Returns the replaced converter.
    pub fn register(
        &self,
        type_key: impl Into<String>,
        converter: impl TypeConverter + 'static,
    ) -> Option<Arc<dyn TypeConverter>> {
        self.register_arc(type_key, Arc::new(converter))
    }

    /// Register a shared converter, replacing any previous one for the key.
    pub fn register_arc(
        &self,
        type_key: impl Into<String>,
        converter: Arc<dyn TypeConverter>,
    ) -> Option<Arc<dyn TypeConverter>> {
        let type_key = type_key.into();
        let previous = self.converters.insert(type_key.clone(), converter);
        if previous.is_some() {
            debug!(type_key = %type_key, "replaced type converter");
        }
        previous
    }

    /// Look up the converter for a key.
    pub fn lookup(&self, type_key: &str) -> Option<Arc<dyn TypeConverter>> {
        self.converters.get(type_key).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if a converter is registered for a key.
    pub fn contains(&self, type_key: &str) -> bool {
        self.converters.contains_key(type_key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.converters.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Convert a value for storage, verbatim if no converter is registered.
    pub fn to_storage(&self, type_key: &str, value: Value) -> Result<Value, ConversionError> {
        match (self.lookup(type_key), value) {
            (_, Value::Null) => Ok(Value::Null),
            (Some(converter), value) => converter.to_storage(value),
            (None, value) => Ok(value),
        }
    }

    /// Convert a stored value back, verbatim if no converter is registered.
    pub fn from_storage(&self, type_key: &str, value: Value) -> Result<Value, ConversionError> {
        match (self.lookup(type_key), value) {
            (_, Value::Null) => Ok(Value::Null),
            (Some(converter), value) => converter.from_storage(value),
            (None, value) => Ok(value),
        }
    }
}

impl Default for TypeConverters {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeConverters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeConverters")
            .field("keys", &self.keys())
            .finish()
    }
}

/// Stores booleans as integers 0/1.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanConverter;

impl TypeConverter for BooleanConverter {
    fn storage_kind(&self) -> ScalarKind {
        ScalarKind::Int64
    }

    fn to_storage(&self, value: Value) -> Result<Value, ConversionError> {
        match value {
            Value::Bool(b) => Ok(Value::Int64(b as i64)),
            Value::Int32(_) | Value::Int64(_) => Ok(value),
            other => Err(ConversionError::unexpected("bool", "bool", &other)),
        }
    }

    fn from_storage(&self, value: Value) -> Result<Value, ConversionError> {
        match value {
            Value::Bool(_) => Ok(value),
            other => other
                .as_i64()
                .map(|i| Value::Bool(i != 0))
                .ok_or_else(|| ConversionError::unexpected("bool", "integer", &other)),
        }
    }
}

/// Stores timestamps as integer microseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampConverter;

impl TypeConverter for TimestampConverter {
    fn storage_kind(&self) -> ScalarKind {
        ScalarKind::Int64
    }

    fn to_storage(&self, value: Value) -> Result<Value, ConversionError> {
        match value {
            Value::Timestamp(t) => Ok(Value::Int64(t)),
            Value::Int64(_) => Ok(value),
            other => Err(ConversionError::unexpected("timestamp", "timestamp", &other)),
        }
    }

    fn from_storage(&self, value: Value) -> Result<Value, ConversionError> {
        match value {
            Value::Timestamp(_) => Ok(value),
            other => other
                .as_i64()
                .map(Value::Timestamp)
                .ok_or_else(|| ConversionError::unexpected("timestamp", "integer", &other)),
        }
    }
}

/// Stores UUIDs as 32-character lowercase hex text.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidConverter;

impl TypeConverter for UuidConverter {
    fn storage_kind(&self) -> ScalarKind {
        ScalarKind::String
    }

    fn to_storage(&self, value: Value) -> Result<Value, ConversionError> {
        match value {
            Value::Uuid(u) => Ok(Value::String(hex::encode(u))),
            other => Err(ConversionError::unexpected("uuid", "uuid", &other)),
        }
    }

    fn from_storage(&self, value: Value) -> Result<Value, ConversionError> {
        let bytes = match value {
            Value::Uuid(_) => return Ok(value),
            Value::String(text) => hex::decode(text.replace('-', ""))
                .map_err(|e| ConversionError::new("uuid", e.to_string()))?,
            Value::Bytes(bytes) => bytes,
            other => return Err(ConversionError::unexpected("uuid", "hex text", &other)),
        };
        let uuid: [u8; 16] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| ConversionError::new("uuid", format!("expected 16 bytes, found {}", b.len())))?;
        Ok(Value::Uuid(uuid))
    }
}
