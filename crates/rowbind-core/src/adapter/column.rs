//! Column definitions for model adapters.

use serde::{Deserialize, Serialize};

/// Scalar kinds a column can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Binary data.
    Bytes,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
    /// UUID (128-bit identifier).
    Uuid,
}

impl ScalarKind {
    /// Converter lookup key for this kind.
    pub fn type_key(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int32 => "i32",
            ScalarKind::Int64 => "i64",
            ScalarKind::Float64 => "f64",
            ScalarKind::String => "string",
            ScalarKind::Bytes => "bytes",
            ScalarKind::Timestamp => "timestamp",
            ScalarKind::Uuid => "uuid",
        }
    }

    /// SQLite column affinity for values of this kind stored verbatim.
    pub fn sql_affinity(&self) -> &'static str {
        match self {
            ScalarKind::Bool | ScalarKind::Int32 | ScalarKind::Int64 | ScalarKind::Timestamp => {
                "INTEGER"
            }
            ScalarKind::Float64 => "REAL",
            ScalarKind::String => "TEXT",
            ScalarKind::Bytes | ScalarKind::Uuid => "BLOB",
        }
    }

    /// Check if this kind is an integer kind.
    pub fn is_integer(&self) -> bool {
        matches!(self, ScalarKind::Int32 | ScalarKind::Int64)
    }
}

/// Declared value type of a stored column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// A built-in scalar kind.
    Scalar(ScalarKind),
    /// An application type, stored through the converter registered under
    /// this key.
    Custom(String),
}

impl ColumnType {
    /// Converter lookup key.
    pub fn type_key(&self) -> &str {
        match self {
            ColumnType::Scalar(kind) => kind.type_key(),
            ColumnType::Custom(key) => key,
        }
    }

    /// The scalar kind, if this is a scalar column.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            ColumnType::Scalar(kind) => Some(*kind),
            ColumnType::Custom(_) => None,
        }
    }
}

impl From<ScalarKind> for ColumnType {
    fn from(kind: ScalarKind) -> Self {
        ColumnType::Scalar(kind)
    }
}

/// A stored column of a table, view or join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Declared value type.
    pub column_type: ColumnType,
    /// Part of the primary key.
    pub primary_key: bool,
    /// Key assigned by the store on insert.
    pub auto_increment: bool,
    /// Accepts NULL.
    pub nullable: bool,
}

impl ColumnDef {
    /// Create a nullable, non-key column.
    pub fn new(name: impl Into<String>, column_type: impl Into<ColumnType>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            primary_key: false,
            auto_increment: false,
            nullable: true,
        }
    }

    /// Create a column holding an application type.
    pub fn custom(name: impl Into<String>, type_key: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Custom(type_key.into()))
    }

    /// Mark the column as (part of) the primary key.
    pub fn with_primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark the column as a store-assigned integer key.
    pub fn with_auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self.with_primary_key()
    }

    /// Reject NULL.
    pub fn with_not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_keys() {
        assert_eq!(ColumnType::Scalar(ScalarKind::Bool).type_key(), "bool");
        assert_eq!(ColumnType::Custom("money".into()).type_key(), "money");
        assert_eq!(ColumnType::Custom("money".into()).scalar_kind(), None);
    }

    #[test]
    fn test_column_builder() {
        let id = ColumnDef::new("id", ScalarKind::Int64).with_auto_increment();
        assert!(id.primary_key);
        assert!(id.auto_increment);
        assert!(!id.nullable);

        let name = ColumnDef::new("name", ScalarKind::String);
        assert!(name.nullable);
        assert!(!name.primary_key);

        let price = ColumnDef::custom("price", "money").with_not_null();
        assert_eq!(price.column_type.type_key(), "money");
        assert!(!price.nullable);
    }
}
