//! Model adapters and the runtime binding around them.

use std::collections::HashSet;
use std::sync::Arc;

use super::column::ColumnDef;
use super::predicate::Predicate;
use super::statement::{self, quote_ident};
use crate::converter::TypeConverters;
use crate::error::Error;
use crate::record::{Model, RecordType};
use crate::value::{Row, Value};

/// What backs a model adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterShape {
    /// A base table. Readable and writable.
    Table,
    /// A SQL view created from `query`. Read-only.
    View {
        /// The `SELECT` defining the view.
        query: String,
    },
    /// An ad-hoc join evaluated from `query` on every read. Read-only.
    Join {
        /// The `SELECT` producing the joined rows.
        query: String,
    },
}

/// The kind of an [`AdapterShape`], without its query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Table,
    View,
    Join,
}

impl ShapeKind {
    /// Shape name used in messages.
    pub fn name(self) -> &'static str {
        match self {
            ShapeKind::Table => "table",
            ShapeKind::View => "view",
            ShapeKind::Join => "join",
        }
    }
}

impl AdapterShape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            AdapterShape::Table => ShapeKind::Table,
            AdapterShape::View { .. } => ShapeKind::View,
            AdapterShape::Join { .. } => ShapeKind::Join,
        }
    }

    /// Shape name used in messages.
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Check if records of this shape can be persisted.
    pub fn is_writable(&self) -> bool {
        matches!(self, AdapterShape::Table)
    }
}

/// Per-record-type mapping between a typed record and its columns.
///
/// Implemented by generated code. `load` receives and `store` produces
/// domain values; the runtime applies type converters on either side.
pub trait ModelAdapter: Send + Sync + 'static {
    /// The record type this adapter maps.
    type Record: Model;

    /// Table, view or join name.
    fn table_name(&self) -> &str;

    /// What backs the adapter.
    fn shape(&self) -> AdapterShape {
        AdapterShape::Table
    }

    /// Stored columns.
    fn columns(&self) -> &[ColumnDef];

    /// Build a record from a row of domain values.
    fn load(&self, row: Row) -> Result<Self::Record, Error>;

    /// Extract the domain values of a record.
    fn store(&self, record: &Self::Record) -> Row;
}

/// A validated model adapter together with the converters it stores through.
pub struct ModelBinding<M: Model> {
    adapter: Arc<dyn ModelAdapter<Record = M>>,
    converters: Arc<TypeConverters>,
    record_type: RecordType,
    table_name: String,
    shape: AdapterShape,
}

impl<M: Model> ModelBinding<M> {
    /// Validate an adapter and bind it to a converter registry.
    pub fn new(
        adapter: Arc<dyn ModelAdapter<Record = M>>,
        converters: Arc<TypeConverters>,
    ) -> Result<Self, Error> {
        let record_type = RecordType::of::<M>();
        let table_name = adapter.table_name().to_string();
        let shape = adapter.shape();

        if table_name.trim().is_empty() {
            return Err(Error::InvalidDeclaration(format!(
                "{} has an empty table name",
                record_type
            )));
        }
        validate_columns(&record_type, &shape, adapter.columns())?;

        match &shape {
            AdapterShape::View { query } | AdapterShape::Join { query }
                if query.trim().is_empty() =>
            {
                return Err(Error::InvalidDeclaration(format!(
                    "{} {} {} has an empty query",
                    record_type,
                    shape.name(),
                    table_name
                )));
            }
            _ => {}
        }

        Ok(Self {
            adapter,
            converters,
            record_type,
            table_name,
            shape,
        })
    }

    /// The bound record type.
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Table, view or join name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// What backs this binding.
    pub fn shape(&self) -> &AdapterShape {
        &self.shape
    }

    /// Stored columns.
    pub fn columns(&self) -> &[ColumnDef] {
        self.adapter.columns()
    }

    /// Primary key columns, in declaration order.
    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns().iter().filter(|c| c.primary_key)
    }

    /// The store-assigned key column, if any.
    pub fn auto_increment_column(&self) -> Option<&ColumnDef> {
        self.columns().iter().find(|c| c.auto_increment)
    }

    /// The converter registry used by this binding.
    pub fn converters(&self) -> &TypeConverters {
        &self.converters
    }

    /// Deserialize a stored row into a record.
    ///
    /// Declared columns go through their converter; extra columns (from
    /// joins, for example) are passed on verbatim.
    pub fn read(&self, mut row: Row) -> Result<M, Error> {
        for column in self.columns() {
            if let Some(stored) = row.remove(&column.name) {
                let value = self
                    .converters
                    .from_storage(column.column_type.type_key(), stored)?;
                row.insert(column.name.clone(), value);
            }
        }
        self.adapter.load(row)
    }

    /// Serialize a record into a row of stored values.
    ///
    /// The row holds exactly the declared columns; absent values become NULL.
    pub fn write(&self, record: &M) -> Result<Row, Error> {
        let mut domain = self.adapter.store(record);
        let mut row = Row::new();
        for column in self.columns() {
            let value = self
                .converters
                .to_storage(column.column_type.type_key(), domain.take(&column.name))?;
            row.insert(column.name.clone(), value);
        }
        Ok(row)
    }

    /// The record's domain values, before any converter runs.
    pub fn domain_row(&self, record: &M) -> Row {
        self.adapter.store(record)
    }

    /// The predicate identifying this exact record.
    pub fn primary_key_predicate(&self, record: &M) -> Result<Predicate, Error> {
        let row = self.write(record)?;
        self.key_predicate(&row)
    }

    /// The key predicate for an already-serialized row.
    pub(crate) fn key_predicate(&self, row: &Row) -> Result<Predicate, Error> {
        let mut predicate = Predicate::new();
        let mut has_key = false;

        for column in self.primary_key_columns() {
            has_key = true;
            let value = row.get(&column.name).cloned().unwrap_or(Value::Null);
            if is_unset(column, &value) {
                return Err(Error::MissingKey {
                    record_type: self.record_type.to_string(),
                    column: column.name.clone(),
                });
            }
            predicate = predicate.and_eq(column.name.clone(), value);
        }

        if !has_key {
            return Err(Error::MissingKey {
                record_type: self.record_type.to_string(),
                column: format!("<no primary key on {}>", self.table_name),
            });
        }
        Ok(predicate)
    }

    /// Fail unless records of this binding can be persisted.
    pub(crate) fn ensure_writable(&self) -> Result<(), Error> {
        if self.shape.is_writable() {
            Ok(())
        } else {
            Err(Error::ReadOnly(format!(
                "{} {}",
                self.shape.name(),
                self.table_name
            )))
        }
    }

    /// The DDL creating this binding's backing object, if it has one.
    pub fn creation_statement(&self) -> Option<String> {
        match &self.shape {
            AdapterShape::Table => Some(statement::create_table(
                &self.table_name,
                self.columns(),
                &self.converters,
            )),
            AdapterShape::View { query } => Some(statement::create_view(&self.table_name, query)),
            AdapterShape::Join { .. } => None,
        }
    }

    /// The `FROM` source reads select from.
    pub fn source_clause(&self) -> String {
        match &self.shape {
            AdapterShape::Table | AdapterShape::View { .. } => quote_ident(&self.table_name),
            AdapterShape::Join { query } => {
                format!("({}) AS {}", query, quote_ident(&self.table_name))
            }
        }
    }
}

impl<M: Model> std::fmt::Debug for ModelBinding<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBinding")
            .field("record_type", &self.record_type)
            .field("table_name", &self.table_name)
            .field("shape", &self.shape)
            .finish()
    }
}

/// A key value the store should assign, or that was never set.
pub(crate) fn is_unset(column: &ColumnDef, value: &Value) -> bool {
    match value {
        Value::Null => true,
        other if column.auto_increment => other.as_i64() == Some(0),
        _ => false,
    }
}

fn validate_columns(
    record_type: &RecordType,
    shape: &AdapterShape,
    columns: &[ColumnDef],
) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for column in columns {
        if column.name.is_empty() {
            return Err(Error::InvalidDeclaration(format!(
                "{} declares a column with an empty name",
                record_type
            )));
        }
        if !seen.insert(column.name.as_str()) {
            return Err(Error::InvalidDeclaration(format!(
                "{} declares column {} twice",
                record_type, column.name
            )));
        }
    }

    if *shape != AdapterShape::Table {
        return Ok(());
    }

    let keys: Vec<&ColumnDef> = columns.iter().filter(|c| c.primary_key).collect();
    if keys.is_empty() {
        return Err(Error::InvalidDeclaration(format!(
            "table for {} declares no primary key",
            record_type
        )));
    }

    if let Some(auto) = columns.iter().find(|c| c.auto_increment) {
        let integer = auto
            .column_type
            .scalar_kind()
            .map(|k| k.is_integer())
            .unwrap_or(false);
        if keys.len() != 1 || !integer {
            return Err(Error::InvalidDeclaration(format!(
                "auto-increment column {} of {} must be the sole integer primary key",
                auto.name, record_type
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ScalarKind;
    use crate::converter::{ConversionError, TypeConverter};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Account {
        id: i64,
        owner: String,
        active: bool,
        balance: f64,
    }
    impl Model for Account {}

    struct AccountAdapter {
        columns: Vec<ColumnDef>,
    }

    impl AccountAdapter {
        fn new() -> Self {
            Self {
                columns: vec![
                    ColumnDef::new("id", ScalarKind::Int64).with_auto_increment(),
                    ColumnDef::new("owner", ScalarKind::String),
                    ColumnDef::new("active", ScalarKind::Bool),
                    ColumnDef::custom("balance", "money"),
                ],
            }
        }
    }

    impl ModelAdapter for AccountAdapter {
        type Record = Account;

        fn table_name(&self) -> &str {
            "accounts"
        }

        fn columns(&self) -> &[ColumnDef] {
            &self.columns
        }

        fn load(&self, mut row: Row) -> Result<Account, Error> {
            Ok(Account {
                id: row.take("id").as_i64().unwrap_or_default(),
                owner: row.take("owner").as_str().unwrap_or_default().to_string(),
                active: row.take("active").as_bool().unwrap_or_default(),
                balance: row.take("balance").as_f64().unwrap_or_default(),
            })
        }

        fn store(&self, record: &Account) -> Row {
            Row::new()
                .with("id", record.id)
                .with("owner", record.owner.as_str())
                .with("active", record.active)
                .with("balance", record.balance)
        }
    }

    struct Cents;

    impl TypeConverter for Cents {
        fn storage_kind(&self) -> ScalarKind {
            ScalarKind::Int64
        }

        fn to_storage(&self, value: Value) -> Result<Value, ConversionError> {
            value
                .as_f64()
                .map(|f| Value::Int64((f * 100.0).round() as i64))
                .ok_or_else(|| ConversionError::new("money", "not a number"))
        }

        fn from_storage(&self, value: Value) -> Result<Value, ConversionError> {
            value
                .as_i64()
                .map(|c| Value::Float64(c as f64 / 100.0))
                .ok_or_else(|| ConversionError::new("money", "not an integer"))
        }
    }

    fn binding() -> ModelBinding<Account> {
        let converters = Arc::new(TypeConverters::new());
        converters.register("money", Cents);
        ModelBinding::new(Arc::new(AccountAdapter::new()), converters).unwrap()
    }

    #[test]
    fn test_write_applies_converters() {
        let account = Account {
            id: 3,
            owner: "ann".into(),
            active: true,
            balance: 10.25,
        };
        let row = binding().write(&account).unwrap();

        assert_eq!(row.get("active"), Some(&Value::Int64(1)));
        assert_eq!(row.get("balance"), Some(&Value::Int64(1025)));
        assert_eq!(row.get("owner"), Some(&Value::String("ann".into())));
    }

    #[test]
    fn test_read_write_roundtrip() {
        let binding = binding();
        let account = Account {
            id: 9,
            owner: "bo".into(),
            active: false,
            balance: 0.5,
        };
        let row = binding.write(&account).unwrap();
        assert_eq!(binding.read(row).unwrap(), account);
    }

    #[test]
    fn test_primary_key_predicate() {
        let binding = binding();
        let predicate = binding
            .primary_key_predicate(&Account {
                id: 5,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(predicate, Predicate::eq("id", 5i64));

        let err = binding.primary_key_predicate(&Account::default()).unwrap_err();
        assert!(matches!(err, Error::MissingKey { ref column, .. } if column == "id"));
    }

    #[test]
    fn test_rejects_table_without_key() {
        struct NoKey;
        impl ModelAdapter for NoKey {
            type Record = Account;
            fn table_name(&self) -> &str {
                "accounts"
            }
            fn columns(&self) -> &[ColumnDef] {
                &[]
            }
            fn load(&self, _row: Row) -> Result<Account, Error> {
                Ok(Account::default())
            }
            fn store(&self, _record: &Account) -> Row {
                Row::new()
            }
        }

        let err = ModelBinding::new(Arc::new(NoKey), Arc::new(TypeConverters::new())).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejects_empty_table_name() {
        struct Unnamed(AccountAdapter);
        impl ModelAdapter for Unnamed {
            type Record = Account;
            fn table_name(&self) -> &str {
                " "
            }
            fn columns(&self) -> &[ColumnDef] {
                self.0.columns()
            }
            fn load(&self, row: Row) -> Result<Account, Error> {
                self.0.load(row)
            }
            fn store(&self, record: &Account) -> Row {
                self.0.store(record)
            }
        }

        let result = ModelBinding::new(
            Arc::new(Unnamed(AccountAdapter::new())),
            Arc::new(TypeConverters::new()),
        );
        assert!(matches!(result, Err(Error::InvalidDeclaration(_))));
    }

    #[test]
    fn test_shapes() {
        let binding = binding();
        assert_eq!(binding.shape().name(), "table");
        assert!(binding.ensure_writable().is_ok());
        assert_eq!(binding.source_clause(), "\"accounts\"");
        assert!(binding
            .creation_statement()
            .unwrap()
            .contains("\"balance\" INTEGER"));

        let join = AdapterShape::Join {
            query: "SELECT 1".into(),
        };
        assert!(!join.is_writable());
    }
}
