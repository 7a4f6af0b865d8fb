//! Buffered query results.
//!
//! A [`DbTable`] is the materialized result of one query: a shared column list and
//! the rows in order. A cursor iterates it without going back to the driver.

use std::sync::Arc;

use crate::value::Value;

/// One result row: native driver values by column position.
#[derive(Debug, Clone, PartialEq)]
pub struct DbRow {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl DbRow {
    /// Create a row. Missing trailing values read as NULL.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the row has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a column position.
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Value of a named column. Names compare case-insensitively.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    /// All values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the row into its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// The buffered rows of one query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DbTable {
    columns: Vec<String>,
    rows: Vec<DbRow>,
}

impl DbTable {
    /// Create an empty result with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a result from raw value rows.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let shared: Arc<[String]> = columns.clone().into();
        let rows = rows
            .into_iter()
            .map(|values| DbRow::new(Arc::clone(&shared), values))
            .collect();
        Self { columns, rows }
    }

    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Append a row of values.
    pub fn push(&mut self, values: Vec<Value>) {
        let shared: Arc<[String]> = match self.rows.first() {
            Some(row) => Arc::clone(&row.columns),
            None => self.columns.clone().into(),
        };
        self.rows.push(DbRow::new(shared, values));
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row at a position.
    pub fn row(&self, idx: usize) -> Option<&DbRow> {
        self.rows.get(idx)
    }

    /// All rows.
    pub fn rows(&self) -> &[DbRow] {
        &self.rows
    }

    /// First value of the first row, for scalar queries.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.get(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_lookup_is_case_insensitive() {
        let t = DbTable::from_rows(
            vec!["Code".to_string(), "Qty".to_string()],
            vec![vec![Value::from("A001"), Value::Int(5)]],
        );
        let row = t.row(0).unwrap();
        assert_eq!(row.get_named("qty"), Some(&Value::Int(5)));
        assert_eq!(row.get_named("missing"), None);
        assert_eq!(t.scalar(), Some(&Value::from("A001")));
    }

    #[test]
    fn test_push_shares_columns() {
        let mut t = DbTable::new(vec!["n".to_string()]);
        assert!(t.is_empty());
        t.push(vec![Value::Int(1)]);
        t.push(vec![Value::Int(2)]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.row(1).unwrap().columns(), &["n".to_string()]);
    }
}
