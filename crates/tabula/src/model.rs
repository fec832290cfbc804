//! The boundary to the domain-object layer.
//!
//! The executor does not store attributes or validate anything itself. It
//! asks a [`Model`] to build instances from rows and to describe itself when
//! it is saved or destroyed.

use std::borrow::Cow;

use indexmap::IndexMap;
use tabula_client::Row;
use tabula_sql::{Filter, JoinPlanNode};
use tabula_types::SqlValue;

use crate::error::Result;

/// Options passed to [`Model::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Whether the instance has never been saved.
    pub is_new_record: bool,
}

/// A domain object backed by one table.
pub trait Model: Sized + Send + 'static {
    /// Table the model is stored in.
    fn table_name() -> &'static str;

    /// Build an instance from a result row.
    ///
    /// When `fill_plan` is present the row came from an eager-load query and
    /// its columns are named `<prefix>+<attribute>`; [`own_columns`] and
    /// [`Row::scoped`] split it per node.
    fn build(row: &Row, options: BuildOptions, fill_plan: Option<&JoinPlanNode>) -> Result<Self>;

    /// Attribute values in column order, as written by `save`.
    fn attributes(&self) -> IndexMap<String, SqlValue>;

    /// Filter matching this instance's row.
    fn identifier(&self) -> Filter;

    /// Whether the instance has never been saved.
    fn is_new_record(&self) -> bool;

    /// Column filled by the server on insert, if any.
    fn auto_increment_field() -> Option<&'static str> {
        None
    }

    /// Store the id the server generated on insert.
    fn set_auto_increment_id(&mut self, _id: u64) {}

    /// Record that the instance now exists in the database.
    fn mark_persisted(&mut self);
}

/// The part of a row that belongs to the plan's root node.
///
/// Without a plan the row is returned as is.
pub fn own_columns<'r>(row: &'r Row, fill_plan: Option<&JoinPlanNode>) -> Cow<'r, Row> {
    match fill_plan {
        Some(plan) => Cow::Owned(row.scoped(plan.prefix())),
        None => Cow::Borrowed(row),
    }
}
