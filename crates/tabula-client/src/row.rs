//! Row representation for query results.
//!
//! Rows share their column metadata through an `Arc<[Column]>`, so a result
//! set of N rows carries one copy of the column list.

use std::sync::Arc;

use tabula_types::{ALIAS_SEPARATOR, FromSql, SqlValue, TypeError};

/// Column metadata describing a result set column.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Column {
    /// Column name (or alias, for projected eager-load columns).
    pub name: String,
    /// Column index (0-based).
    pub index: usize,
    /// Server type name (e.g. "BIGINT", "VARCHAR").
    pub type_name: String,
}

impl Column {
    /// Create a new column with basic metadata.
    pub fn new(name: impl Into<String>, index: usize, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index,
            type_name: type_name.into(),
        }
    }
}

/// A single row from a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row from already-decoded values.
    ///
    /// Missing trailing values are padded with NULL so that every column has
    /// a value.
    pub fn from_values(columns: impl Into<Arc<[Column]>>, mut values: Vec<SqlValue>) -> Self {
        let columns = columns.into();
        values.resize(columns.len(), SqlValue::Null);
        Self { columns, values }
    }

    /// Build a row from `(name, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        let (columns, values): (Vec<_>, Vec<_>) = pairs
            .into_iter()
            .enumerate()
            .map(|(index, (name, value))| {
                let value = value.into();
                (Column::new(name, index, value.type_name()), value)
            })
            .unzip();
        Self::from_values(columns, values)
    }

    /// Find the index of a column by name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Get a typed value by column index.
    pub fn get<T: FromSql>(&self, index: usize) -> Result<T, TypeError> {
        self.values
            .get(index)
            .ok_or_else(|| TypeError::TypeMismatch {
                expected: "valid column index",
                actual: format!("index {index} out of bounds"),
            })
            .and_then(T::from_sql)
    }

    /// Get a typed value by column name.
    pub fn get_by_name<T: FromSql>(&self, name: &str) -> Result<T, TypeError> {
        let index = self
            .find_by_name(name)
            .ok_or_else(|| TypeError::TypeMismatch {
                expected: "valid column name",
                actual: format!("column '{name}' not found"),
            })?;

        self.get(index)
    }

    /// Get a typed value by name, returning `None` on any failure.
    #[must_use]
    pub fn try_get_by_name<T: FromSql>(&self, name: &str) -> Option<T> {
        self.get_by_name(name).ok()
    }

    /// Get the raw value at an index.
    #[must_use]
    pub fn get_raw(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Get the raw value of a named column.
    #[must_use]
    pub fn get_raw_by_name(&self, name: &str) -> Option<&SqlValue> {
        self.find_by_name(name).and_then(|i| self.values.get(i))
    }

    /// Check if the value at an index is NULL (or absent).
    #[must_use]
    pub fn is_null(&self, index: usize) -> bool {
        self.values.get(index).is_none_or(SqlValue::is_null)
    }

    /// Number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column metadata for this row.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Iterate `(column name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .zip(self.values.iter())
            .map(|(c, v)| (c.name.as_str(), v))
    }

    /// Extract the columns belonging to one eager-load node.
    ///
    /// Columns aliased `<prefix>+<attribute>` are returned renamed to
    /// `<attribute>`; every other column is left out. Column order is kept.
    #[must_use]
    pub fn scoped(&self, prefix: &str) -> Row {
        let mut columns = Vec::new();
        let mut values = Vec::new();

        for (name, value) in self.iter() {
            let Some((head, attribute)) = name.split_once(ALIAS_SEPARATOR) else {
                continue;
            };
            if head == prefix {
                columns.push(Column::new(attribute, columns.len(), value.type_name()));
                values.push(value.clone());
            }
        }

        Row::from_values(columns, values)
    }

    /// Check whether every value in the row is NULL.
    ///
    /// An outer-joined association with no match produces such a row.
    #[must_use]
    pub fn is_all_null(&self) -> bool {
        self.values.iter().all(SqlValue::is_null)
    }

    /// Consume the row, returning its values.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn eager_row() -> Row {
        Row::from_pairs([
            ("u+id", SqlValue::Int(1)),
            ("u+name", SqlValue::from("Alice")),
            ("p+bio", SqlValue::from("hi")),
            ("p+user_id", SqlValue::Int(1)),
        ])
    }

    #[test]
    fn test_get_by_index_and_name() {
        let row = Row::from_pairs([("id", SqlValue::Int(7)), ("name", SqlValue::from("Bob"))]);
        assert_eq!(row.get::<i64>(0).unwrap(), 7);
        assert_eq!(row.get_by_name::<String>("name").unwrap(), "Bob");
        assert!(row.get::<i64>(9).is_err());
        assert!(row.get_by_name::<i64>("missing").is_err());
        assert_eq!(row.try_get_by_name::<i64>("missing"), None);
    }

    #[test]
    fn test_from_values_pads_missing() {
        let columns = vec![Column::new("a", 0, "INT"), Column::new("b", 1, "INT")];
        let row = Row::from_values(columns, vec![SqlValue::Int(1)]);
        assert_eq!(row.len(), 2);
        assert!(row.is_null(1));
    }

    #[test]
    fn test_scoped_strips_prefix() {
        let row = eager_row();
        let user = row.scoped("u");
        assert_eq!(user.len(), 2);
        assert_eq!(user.columns()[0].name, "id");
        assert_eq!(user.get_by_name::<String>("name").unwrap(), "Alice");

        let profile = row.scoped("p");
        assert_eq!(profile.get_by_name::<String>("bio").unwrap(), "hi");
        assert!(row.scoped("x").is_empty());
    }

    #[test]
    fn test_scoped_does_not_match_longer_prefix() {
        let row = Row::from_pairs([("u+id", 1i64), ("uu+id", 2i64)]);
        assert_eq!(row.scoped("u").get_by_name::<i64>("id").unwrap(), 1);
        assert_eq!(row.scoped("uu").get_by_name::<i64>("id").unwrap(), 2);
    }

    #[test]
    fn test_all_null() {
        let row = Row::from_pairs([("p+bio", SqlValue::Null)]);
        assert!(row.is_all_null());
        assert!(!eager_row().is_all_null());
    }
}
