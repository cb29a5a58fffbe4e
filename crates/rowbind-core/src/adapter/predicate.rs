//! Equality predicates over columns.

use super::statement::quote_ident;
use crate::value::Value;

/// A conjunction of `column = value` conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    conditions: Vec<(String, Value)>,
}

impl Predicate {
    /// Create an empty predicate (matches every row).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a predicate with a single condition.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and_eq(column, value)
    }

    /// Add an `AND column = value` condition.
    pub fn and_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    /// The conditions, in order.
    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// Check if the predicate has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Render as a SQL boolean expression with `?` placeholders.
    ///
    /// Null values render as `IS NULL` and take no parameter. An empty
    /// predicate renders as `1 = 1`.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        if self.conditions.is_empty() {
            return ("1 = 1".to_string(), Vec::new());
        }

        let mut params = Vec::with_capacity(self.conditions.len());
        let clauses: Vec<String> = self
            .conditions
            .iter()
            .map(|(column, value)| {
                if value.is_null() {
                    format!("{} IS NULL", quote_ident(column))
                } else {
                    params.push(value.clone());
                    format!("{} = ?", quote_ident(column))
                }
            })
            .collect();

        (clauses.join(" AND "), params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_condition() {
        let (sql, params) = Predicate::eq("id", 1i64).to_sql();
        assert_eq!(sql, "\"id\" = ?");
        assert_eq!(params, vec![Value::Int64(1)]);
    }

    #[test]
    fn test_composite_condition() {
        let predicate = Predicate::eq("tenant", "acme").and_eq("id", 7i64);
        let (sql, params) = predicate.to_sql();
        assert_eq!(sql, "\"tenant\" = ? AND \"id\" = ?");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_null_and_empty() {
        let (sql, params) = Predicate::eq("deleted_at", Value::Null).to_sql();
        assert_eq!(sql, "\"deleted_at\" IS NULL");
        assert!(params.is_empty());

        let (sql, _) = Predicate::new().to_sql();
        assert_eq!(sql, "1 = 1");
    }
}
