//! Tabular query results
//!
//! A [`RowSet`] holds ordered columns plus ordered rows and enforces one
//! invariant: every row is exactly as wide as the column list.

use std::hash::Hash;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::value::{ColumnType, FromValue, Value};

/// A named, typed output column; registration order fixes row decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryColumn {
    pub name: String,
    pub label: String,
    pub datatype: ColumnType,
}

impl QueryColumn {
    /// Create a column whose label equals its name
    pub fn new(name: impl Into<String>, datatype: ColumnType) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            datatype,
        }
    }

    /// Create a column with a distinct display label
    pub fn with_label(
        name: impl Into<String>,
        label: impl Into<String>,
        datatype: ColumnType,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            datatype,
        }
    }
}

/// Ordered columns and rows produced by executing a query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowSet {
    columns: Vec<QueryColumn>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Create an empty result with the given columns
    pub fn new(columns: Vec<QueryColumn>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// The registered columns, in output order
    pub fn columns(&self) -> &[QueryColumn] {
        &self.columns
    }

    /// The result rows, in query order
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of result rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row; its width must match the column count
    pub fn add_row(&mut self, values: Vec<Value>) -> QueryResult<()> {
        if values.len() != self.columns.len() {
            return Err(QueryError::invalid_argument(format!(
                "row width {} does not match column count {}",
                values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(values);
        Ok(())
    }

    /// Append a single scalar as a one-column row
    pub fn add_value(&mut self, value: Value) -> QueryResult<()> {
        self.add_row(vec![value])
    }

    /// The values of one column, decoded to `T`
    pub fn value_list<T: FromValue>(&self, column_name: &str) -> QueryResult<Vec<T>> {
        let index = self.column_index(column_name)?;
        self.rows
            .iter()
            .map(|row| T::from_value(&row[index]))
            .collect()
    }

    /// Pair the first two columns of every row into an insertion-ordered map.
    ///
    /// Duplicate keys keep their first position; the last row's value wins.
    pub fn key_value_map<K, V>(&self) -> QueryResult<IndexMap<K, V>>
    where
        K: FromValue + Hash + Eq,
        V: FromValue,
    {
        if self.columns.len() < 2 {
            return Err(QueryError::invalid_argument(
                "key_value_map requires at least two registered columns",
            ));
        }
        let mut map = IndexMap::with_capacity(self.rows.len());
        for row in &self.rows {
            map.insert(K::from_value(&row[0])?, V::from_value(&row[1])?);
        }
        Ok(map)
    }

    fn column_index(&self, name: &str) -> QueryResult<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| {
                QueryError::invalid_argument(format!("no column named {name} in result set"))
            })
    }
}
