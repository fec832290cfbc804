//! FromRow trait for row-to-struct mapping.
//!
//! Types that don't need the full domain-object lifecycle can implement
//! `FromRow` and read query results straight into plain structs.

use crate::error::Error;
use crate::row::Row;

/// Trait for types that can be constructed from a database row.
///
/// # Example
///
/// ```rust
/// use tabula_client::{Error, FromRow, Row};
///
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &Row) -> Result<Self, Error> {
///         Ok(Self {
///             id: row.get_by_name("id")?,
///             name: row.get_by_name("name")?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// Construct an instance of this type from a database row.
    ///
    /// # Errors
    ///
    /// Returns an error if a required column is missing or a value cannot be
    /// converted to the expected Rust type.
    fn from_row(row: &Row) -> Result<Self, Error>;
}

/// Extension trait for iterating over query results as typed structs.
///
/// Implemented for any iterator of `Result<Row, Error>`.
pub trait RowIteratorExt: Iterator<Item = Result<Row, Error>> + Sized {
    /// Map each row to a struct implementing `FromRow`.
    fn map_rows<T: FromRow>(self) -> MapRows<Self, T>;
}

impl<I: Iterator<Item = Result<Row, Error>>> RowIteratorExt for I {
    fn map_rows<T: FromRow>(self) -> MapRows<Self, T> {
        MapRows {
            inner: self,
            _marker: std::marker::PhantomData,
        }
    }
}

/// Iterator adapter that maps rows to typed structs.
pub struct MapRows<I, T> {
    inner: I,
    _marker: std::marker::PhantomData<T>,
}

impl<I, T> Iterator for MapRows<I, T>
where
    I: Iterator<Item = Result<Row, Error>>,
    T: FromRow,
{
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|result| result.and_then(|row| T::from_row(&row)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::row::Column;
    use tabula_types::SqlValue;

    #[derive(Debug)]
    struct Account {
        id: i64,
        owner: String,
        balance: Option<f64>,
    }

    impl FromRow for Account {
        fn from_row(row: &Row) -> Result<Self, Error> {
            Ok(Self {
                id: row.get_by_name("id")?,
                owner: row.get_by_name("owner")?,
                balance: row.get_by_name("balance")?,
            })
        }
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", 0, "BIGINT"),
            Column::new("owner", 1, "VARCHAR"),
            Column::new("balance", 2, "DOUBLE"),
        ]
    }

    #[test]
    fn test_from_row_text_protocol() {
        // Text protocol: numbers arrive as strings.
        let row = Row::from_values(
            columns(),
            vec![
                SqlValue::from("12"),
                SqlValue::from("carol"),
                SqlValue::Null,
            ],
        );

        let account = Account::from_row(&row).unwrap();
        assert_eq!(account.id, 12);
        assert_eq!(account.owner, "carol");
        assert_eq!(account.balance, None);
    }

    #[test]
    fn test_map_rows_stops_on_error() {
        let rows = vec![
            Ok(Row::from_values(
                columns(),
                vec![SqlValue::Int(1), SqlValue::from("a"), SqlValue::Double(1.5)],
            )),
            Ok(Row::from_values(
                columns(),
                vec![SqlValue::Null, SqlValue::from("b"), SqlValue::Null],
            )),
        ];

        let result = rows
            .into_iter()
            .map_rows::<Account>()
            .collect::<Result<Vec<_>, _>>();

        assert!(matches!(result, Err(Error::Type(_))));
    }
}
