//! Filter descriptions and `WHERE` clause compilation.
//!
//! A [`Filter`] is one of four shapes:
//!
//! | Shape | Compiles to |
//! |-------|-------------|
//! | `Map` | `` `k` = v AND `k2` IN (a,b) AND `k3` IS NULL `` |
//! | `Raw` | the text as given |
//! | `Format` | the template with each `?` replaced by an escaped argument |
//! | `Id` | `` `id`=n `` |
//!
//! `Raw` text is trusted: the caller is responsible for escaping it.

use indexmap::IndexMap;
use tabula_types::{SqlValue, escape, quote_identifier};

use crate::error::CompileError;

/// Right-hand side of one condition in a filter map.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Equality with a single value, or `IS NULL` for `Null`.
    Value(SqlValue),
    /// Membership in a list of values.
    List(Vec<SqlValue>),
}

impl FilterValue {
    /// Build a membership condition.
    pub fn list<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SqlValue>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    /// Match `NULL`.
    #[must_use]
    pub fn null() -> Self {
        Self::Value(SqlValue::Null)
    }
}

impl From<SqlValue> for FilterValue {
    fn from(value: SqlValue) -> Self {
        Self::Value(value)
    }
}

impl From<Vec<SqlValue>> for FilterValue {
    fn from(values: Vec<SqlValue>) -> Self {
        Self::List(values)
    }
}

macro_rules! filter_value_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FilterValue {
                fn from(value: $ty) -> Self {
                    Self::Value(value.into())
                }
            }
        )*
    };
}

filter_value_from!(bool, i32, i64, u32, u64, f64, String, &str);

/// A `WHERE` condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Conjunction of column conditions, compiled in insertion order.
    Map(IndexMap<String, FilterValue>),
    /// Pre-escaped predicate text.
    Raw(String),
    /// Template with `?` placeholders and the values to substitute.
    Format(String, Vec<SqlValue>),
    /// Numeric primary-key shorthand.
    Id(i64),
}

impl Filter {
    /// Build a map filter from column/value pairs.
    pub fn map<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FilterValue>,
    {
        Self::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// A single equality condition.
    pub fn eq(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::map([(column, value)])
    }

    /// Trusted predicate text.
    pub fn raw(text: impl Into<String>) -> Self {
        Self::Raw(text.into())
    }

    /// Template with `?` placeholders.
    pub fn format<I, T>(template: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SqlValue>,
    {
        Self::Format(template.into(), args.into_iter().map(Into::into).collect())
    }
}

impl From<i64> for Filter {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

/// Compile a filter into the body of a `WHERE` clause.
pub fn where_clause(filter: &Filter) -> Result<String, CompileError> {
    match filter {
        Filter::Map(map) => map_conditions(map),
        Filter::Raw(text) => Ok(text.clone()),
        Filter::Format(template, args) => substitute(template, args),
        Filter::Id(id) => Ok(format!("{}={}", quote_identifier("id"), id)),
    }
}

fn map_conditions(map: &IndexMap<String, FilterValue>) -> Result<String, CompileError> {
    if map.is_empty() {
        return Err(CompileError::EmptyFilter);
    }

    let mut conditions = Vec::with_capacity(map.len());
    for (key, value) in map {
        // Keys that already contain a backtick are pre-quoted, e.g. `t`.`col`.
        let column = if key.contains('`') {
            key.clone()
        } else {
            quote_identifier(key)
        };

        let condition = match value {
            // Decided on the rendered literal: non-finite doubles also
            // render as NULL.
            FilterValue::Value(v) => match escape(v) {
                literal if literal == "NULL" => format!("{column} IS NULL"),
                literal => format!("{column} = {literal}"),
            },
            FilterValue::List(values) if values.is_empty() => {
                return Err(CompileError::EmptyInList(key.clone()));
            }
            FilterValue::List(values) => {
                let list: Vec<String> = values.iter().map(escape).collect();
                format!("{column} IN ({})", list.join(","))
            }
        };
        conditions.push(condition);
    }
    Ok(conditions.join(" AND "))
}

fn substitute(template: &str, args: &[SqlValue]) -> Result<String, CompileError> {
    let placeholders = template.matches('?').count();
    if placeholders != args.len() {
        return Err(CompileError::PlaceholderMismatch {
            placeholders,
            arguments: args.len(),
        });
    }

    let mut out = String::with_capacity(template.len() + args.len() * 8);
    let mut pieces = template.split('?');
    if let Some(head) = pieces.next() {
        out.push_str(head);
    }
    for (piece, arg) in pieces.zip(args) {
        out.push_str(&escape(arg));
        out.push_str(piece);
    }
    Ok(out)
}
