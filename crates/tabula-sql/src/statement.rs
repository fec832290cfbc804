//! MySQL statement compilation.
//!
//! Each function returns finished SQL text. Values are escaped through
//! [`tabula_types::escape`] and identifiers quoted through
//! [`tabula_types::quote_identifier`]; the only unescaped input is a
//! [`Filter::Raw`](crate::Filter::Raw) predicate and the `order` clause.

use indexmap::IndexMap;
use tabula_types::{SqlValue, escape, quote_identifier};

use crate::error::CompileError;
use crate::filter::{Filter, where_clause};
use crate::join_plan::{JoinPlanNode, compile};

const PRIMARY_KEY: &str = "PRIMARY KEY";

/// Options for [`select`] and [`count`].
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct SelectOptions<'a> {
    /// Columns to project; `None` selects `*`.
    pub attributes: Option<Vec<String>>,
    /// `WHERE` condition.
    pub filter: Option<Filter>,
    /// Extra join text appended after the source.
    pub join: Option<String>,
    /// `ORDER BY` text, e.g. `id DESC`.
    pub order: Option<String>,
    /// `GROUP BY` column.
    pub group: Option<String>,
    /// Maximum number of rows.
    pub limit: Option<u64>,
    /// Rows to skip; only used together with `limit`.
    pub offset: Option<u64>,
    /// Eager-load plan supplying source and projection.
    pub fill_plan: Option<&'a JoinPlanNode>,
}

impl<'a> SelectOptions<'a> {
    /// Create empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Project only these columns.
    #[must_use]
    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    /// Set the `WHERE` condition.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Append join text after the source.
    #[must_use]
    pub fn join(mut self, join: impl Into<String>) -> Self {
        self.join = Some(join.into());
        self
    }

    /// Set the `ORDER BY` text.
    #[must_use]
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    /// Set the `GROUP BY` column.
    #[must_use]
    pub fn group(mut self, column: impl Into<String>) -> Self {
        self.group = Some(column.into());
        self
    }

    /// Set the row limit.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the row offset.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Take source and projection from an eager-load plan.
    #[must_use]
    pub fn fill_plan(mut self, plan: &'a JoinPlanNode) -> Self {
        self.fill_plan = Some(plan);
        self
    }
}

/// `CREATE TABLE IF NOT EXISTS` for the given column definitions.
///
/// A `PRIMARY KEY` marker inside a column type is removed and the column is
/// listed in a trailing composite `PRIMARY KEY (...)` clause instead.
pub fn create_table<I, K, V>(table: &str, columns: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut primary_keys = Vec::new();
    let mut definitions = Vec::new();

    for (name, data_type) in columns {
        let name = quote_identifier(name.as_ref());
        let data_type = data_type.as_ref();
        let data_type = match data_type.find(PRIMARY_KEY) {
            Some(pos) => {
                primary_keys.push(name.clone());
                let before = data_type[..pos].trim_end();
                let after = data_type[pos + PRIMARY_KEY.len()..].trim_start();
                match (before.is_empty(), after.is_empty()) {
                    (_, true) => before.to_owned(),
                    (true, false) => after.to_owned(),
                    (false, false) => format!("{before} {after}"),
                }
            }
            None => data_type.to_owned(),
        };
        definitions.push(format!("{name} {data_type}"));
    }

    let mut body = definitions.join(", ");
    if !primary_keys.is_empty() {
        body.push_str(&format!(", PRIMARY KEY ({})", primary_keys.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({body});",
        quote_identifier(table)
    )
}

/// `DROP TABLE IF EXISTS`.
#[must_use]
pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {};", quote_identifier(table))
}

/// `SELECT` statement.
pub fn select(table: &str, options: &SelectOptions<'_>) -> Result<String, CompileError> {
    let (projection, source) = match options.fill_plan {
        Some(root) => {
            root.validate()?;
            let plan = compile(root);
            (plan.projection_list(), plan.from_clause())
        }
        None => {
            let projection = match &options.attributes {
                Some(attrs) if !attrs.is_empty() => attrs
                    .iter()
                    .map(|a| quote_identifier(a))
                    .collect::<Vec<_>>()
                    .join(", "),
                _ => "*".to_owned(),
            };
            (projection, quote_identifier(table))
        }
    };
    build_select(&projection, &source, options)
}

/// `SELECT count(*)` with the same clauses [`select`] would emit.
pub fn count(table: &str, options: &SelectOptions<'_>) -> Result<String, CompileError> {
    let source = match options.fill_plan {
        Some(root) => {
            root.validate()?;
            compile(root).from_clause()
        }
        None => quote_identifier(table),
    };
    build_select("count(*)", &source, options)
}

fn build_select(
    projection: &str,
    source: &str,
    options: &SelectOptions<'_>,
) -> Result<String, CompileError> {
    let mut sql = format!("SELECT {projection} FROM {source}");

    if let Some(join) = &options.join {
        sql.push(' ');
        sql.push_str(join);
    }
    if let Some(filter) = &options.filter {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause(filter)?);
    }
    if let Some(order) = &options.order {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }
    if let Some(group) = &options.group {
        sql.push_str(" GROUP BY ");
        sql.push_str(&quote_identifier(group));
    }
    if let Some(limit) = options.limit {
        match options.offset {
            Some(offset) => sql.push_str(&format!(" LIMIT {offset}, {limit}")),
            None => sql.push_str(&format!(" LIMIT {limit}")),
        }
    }
    sql.push(';');
    Ok(sql)
}

/// `INSERT` statement.
///
/// With `ignore_duplicates` the statement is `INSERT IGNORE`. Each key in
/// `upsert_keys` is updated from the inserted value on a duplicate key.
pub fn insert(
    table: &str,
    values: &IndexMap<String, SqlValue>,
    ignore_duplicates: bool,
    upsert_keys: Option<&[&str]>,
) -> Result<String, CompileError> {
    if values.is_empty() {
        return Err(CompileError::EmptyValues("insert"));
    }

    let columns: Vec<String> = values.keys().map(|k| quote_identifier(k)).collect();
    let literals: Vec<String> = values.values().map(escape).collect();

    let mut sql = format!(
        "INSERT {}INTO {} ({}) VALUES ({})",
        if ignore_duplicates { "IGNORE " } else { "" },
        quote_identifier(table),
        columns.join(","),
        literals.join(",")
    );

    if let Some(keys) = upsert_keys {
        let assignments = keys
            .iter()
            .map(|key| {
                values
                    .get(*key)
                    .map(|v| format!("{}={}", quote_identifier(key), escape(v)))
                    .ok_or_else(|| CompileError::UnknownUpsertKey((*key).to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        sql.push_str(" ON DUPLICATE KEY UPDATE ");
        sql.push_str(&assignments.join(","));
    }

    sql.push(';');
    Ok(sql)
}

/// `UPDATE` statement.
pub fn update(
    table: &str,
    values: &IndexMap<String, SqlValue>,
    filter: &Filter,
) -> Result<String, CompileError> {
    if values.is_empty() {
        return Err(CompileError::EmptyValues("update"));
    }

    let assignments: Vec<String> = values
        .iter()
        .map(|(k, v)| format!("{}={}", quote_identifier(k), escape(v)))
        .collect();

    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        quote_identifier(table),
        assignments.join(","),
        where_clause(filter)?
    ))
}

/// `DELETE` statement; `limit` defaults to 1.
pub fn delete(table: &str, filter: &Filter, limit: Option<u64>) -> Result<String, CompileError> {
    Ok(format!(
        "DELETE FROM {} WHERE {} LIMIT {}",
        quote_identifier(table),
        where_clause(filter)?,
        limit.unwrap_or(1)
    ))
}
