//! SQL statement generation for model bindings.

use std::fmt;

use super::column::ColumnDef;
use super::predicate::Predicate;
use crate::converter::TypeConverters;
use crate::value::{Row, Value};

/// A SQL statement with positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Parameter values, in placeholder order.
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.map(quote_ident).collect::<Vec<_>>().join(", ")
}

/// `CREATE TABLE IF NOT EXISTS` for a table's columns.
///
/// Column affinity follows the storage kind of the converter registered for
/// the column's type, falling back to the declared scalar kind.
pub(crate) fn create_table(table: &str, columns: &[ColumnDef], converters: &TypeConverters) -> String {
    let mut definitions: Vec<String> = columns
        .iter()
        .map(|column| {
            let affinity = if column.auto_increment {
                "INTEGER"
            } else {
                converters
                    .lookup(column.column_type.type_key())
                    .map(|c| c.storage_kind())
                    .or_else(|| column.column_type.scalar_kind())
                    .map(|kind| kind.sql_affinity())
                    .unwrap_or("BLOB")
            };

            let mut definition = format!("{} {}", quote_ident(&column.name), affinity);
            if column.auto_increment {
                definition.push_str(" PRIMARY KEY AUTOINCREMENT");
            } else if !column.nullable {
                definition.push_str(" NOT NULL");
            }
            definition
        })
        .collect();

    if !columns.iter().any(|c| c.auto_increment) {
        let keys: Vec<&str> = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect();
        if !keys.is_empty() {
            definitions.push(format!("PRIMARY KEY ({})", column_list(keys.into_iter())));
        }
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        definitions.join(", ")
    )
}

/// `CREATE VIEW IF NOT EXISTS` over a query.
pub(crate) fn create_view(view: &str, query: &str) -> String {
    format!("CREATE VIEW IF NOT EXISTS {} AS {}", quote_ident(view), query)
}

/// Insert every column of the row except `skip`.
pub(crate) fn insert(table: &str, row: &Row, columns: &[ColumnDef], skip: Option<&str>) -> Statement {
    let included: Vec<&ColumnDef> = columns
        .iter()
        .filter(|c| Some(c.name.as_str()) != skip)
        .collect();

    if included.is_empty() {
        return Statement::new(
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table)),
            Vec::new(),
        );
    }

    let placeholders = vec!["?"; included.len()].join(", ");
    let params = included
        .iter()
        .map(|c| row.get(&c.name).cloned().unwrap_or(Value::Null))
        .collect();

    Statement::new(
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            column_list(included.iter().map(|c| c.name.as_str())),
            placeholders
        ),
        params,
    )
}

/// Insert every column of the row unless a row with the same key exists.
///
/// The conflict is resolved by the store in the same statement, so a
/// concurrent writer of the same key cannot turn this into a constraint error.
pub(crate) fn insert_absent(table: &str, row: &Row, columns: &[ColumnDef]) -> Statement {
    let mut stmt = insert(table, row, columns, None);
    let keys: Vec<&str> = columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.as_str())
        .collect();
    if !keys.is_empty() {
        stmt.sql = format!(
            "{} ON CONFLICT ({}) DO NOTHING",
            stmt.sql,
            column_list(keys.into_iter())
        );
    }
    stmt
}

/// Update the non-key columns of rows matching the predicate.
///
/// Returns `None` when every column is part of the key.
pub(crate) fn update(
    table: &str,
    row: &Row,
    columns: &[ColumnDef],
    predicate: &Predicate,
) -> Option<Statement> {
    let assigned: Vec<&ColumnDef> = columns.iter().filter(|c| !c.primary_key).collect();
    if assigned.is_empty() {
        return None;
    }

    let mut params: Vec<Value> = assigned
        .iter()
        .map(|c| row.get(&c.name).cloned().unwrap_or(Value::Null))
        .collect();
    let set_clause = assigned
        .iter()
        .map(|c| format!("{} = ?", quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");

    let (where_clause, where_params) = predicate.to_sql();
    params.extend(where_params);

    Some(Statement::new(
        format!(
            "UPDATE {} SET {} WHERE {}",
            quote_ident(table),
            set_clause,
            where_clause
        ),
        params,
    ))
}

/// Delete rows matching the predicate.
pub(crate) fn delete(table: &str, predicate: &Predicate) -> Statement {
    let (where_clause, params) = predicate.to_sql();
    Statement::new(
        format!("DELETE FROM {} WHERE {}", quote_ident(table), where_clause),
        params,
    )
}

/// Check a source clause for at least one row matching the predicate.
pub(crate) fn exists(source: &str, predicate: &Predicate) -> Statement {
    let (where_clause, params) = predicate.to_sql();
    Statement::new(
        format!("SELECT 1 FROM {} WHERE {} LIMIT 1", source, where_clause),
        params,
    )
}

/// Select every column from a source clause, optionally filtered.
pub(crate) fn select(source: &str, predicate: Option<&Predicate>) -> Statement {
    match predicate.filter(|p| !p.is_empty()) {
        Some(predicate) => {
            let (where_clause, params) = predicate.to_sql();
            Statement::new(
                format!("SELECT * FROM {} WHERE {}", source, where_clause),
                params,
            )
        }
        None => Statement::new(format!("SELECT * FROM {}", source), Vec::new()),
    }
}
