//! Associations between tables.
//!
//! An association knows how to join its target table onto its source table
//! and which foreign-key column that join relies on. Everything else about
//! associations (accessor methods on instances, cascading) belongs to the
//! model layer.

use std::fmt;

use crate::inflection::{accessor_method, foreign_key, singularize};

/// Column type given to derived foreign keys.
pub const FOREIGN_KEY_TYPE: &str = "INTEGER";

/// A foreign-key column an association needs to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyColumn {
    /// Table the column lives in.
    pub table: String,
    /// Column name.
    pub column: String,
    /// Column type for schema generation.
    pub sql_type: &'static str,
}

/// Getter and setter method names for an association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessors {
    /// e.g. `getProfile`.
    pub get: String,
    /// e.g. `setProfile`.
    pub set: String,
}

/// A relation between a source table and a target table.
pub trait Association: fmt::Debug + Send + Sync {
    /// Join clause bringing the target in under `target_alias`, given the
    /// source is aliased `source_alias`.
    fn join_statement(&self, source_alias: &str, target_alias: &str) -> String;

    /// The foreign-key column this association relies on.
    fn foreign_key_column(&self) -> ForeignKeyColumn;

    /// Name the association is reached by from a source instance.
    fn accessor(&self) -> &str;

    /// Table the association points to.
    fn target_table(&self) -> &str;

    /// Getter and setter names derived from the accessor.
    fn accessors(&self) -> Accessors {
        Accessors {
            get: accessor_method("get", self.accessor()),
            set: accessor_method("set", self.accessor()),
        }
    }
}

/// Options shared by both association kinds.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AssociationOptions {
    /// Alias the association is known by.
    pub alias: Option<String>,
    /// Explicit foreign-key column.
    pub foreign_key: Option<String>,
    /// Identity column on the referenced side.
    pub references: String,
    /// Whether derived foreign keys are snake-cased.
    pub underscored: bool,
}

impl Default for AssociationOptions {
    fn default() -> Self {
        Self {
            alias: None,
            foreign_key: None,
            references: "id".into(),
            underscored: true,
        }
    }
}

impl AssociationOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the alias (`as`).
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Set an explicit foreign-key column.
    #[must_use]
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    /// Set the identity column on the referenced side.
    #[must_use]
    pub fn references(mut self, column: impl Into<String>) -> Self {
        self.references = column.into();
        self
    }

    /// Enable or disable snake-casing of derived foreign keys.
    #[must_use]
    pub fn underscored(mut self, enabled: bool) -> Self {
        self.underscored = enabled;
        self
    }
}

/// Resolved names shared by both association kinds.
#[derive(Debug, Clone)]
struct Resolved {
    source: String,
    target: String,
    identifier: String,
    references: String,
    accessor: String,
}

impl Resolved {
    /// `keyed_on` is the table whose name the foreign key is derived from
    /// when nothing more specific applies.
    fn new(source: &str, target: &str, keyed_on: &str, options: AssociationOptions) -> Self {
        let self_association = source == target;
        let identifier = match (&options.foreign_key, &options.alias) {
            (Some(fk), _) => fk.clone(),
            (None, Some(alias)) if self_association => foreign_key(alias, options.underscored),
            (None, _) => foreign_key(keyed_on, options.underscored),
        };
        let accessor = options.alias.unwrap_or_else(|| singularize(target));
        Self {
            source: source.to_owned(),
            target: target.to_owned(),
            identifier,
            references: options.references,
            accessor,
        }
    }
}

/// The foreign key lives in the source table.
///
/// Joins as `LEFT OUTER JOIN target AS t ON t.<references> = s.<foreign key>`,
/// so source rows without a match are kept.
#[derive(Debug, Clone)]
pub struct BelongsTo(Resolved);

impl BelongsTo {
    /// Associate `source` with the `target` row its foreign key points to.
    pub fn new(source: &str, target: &str, options: AssociationOptions) -> Self {
        Self(Resolved::new(source, target, target, options))
    }

    /// The foreign-key column in the source table.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.0.identifier
    }
}

impl Association for BelongsTo {
    fn join_statement(&self, source_alias: &str, target_alias: &str) -> String {
        format!(
            "LEFT OUTER JOIN {} AS {target_alias} ON {target_alias}.{} = {source_alias}.{}",
            self.0.target, self.0.references, self.0.identifier
        )
    }

    fn foreign_key_column(&self) -> ForeignKeyColumn {
        ForeignKeyColumn {
            table: self.0.source.clone(),
            column: self.0.identifier.clone(),
            sql_type: FOREIGN_KEY_TYPE,
        }
    }

    fn accessor(&self) -> &str {
        &self.0.accessor
    }

    fn target_table(&self) -> &str {
        &self.0.target
    }
}

/// The foreign key lives in the target table.
///
/// Joins as `JOIN target AS t ON t.<foreign key> = s.<references>`.
#[derive(Debug, Clone)]
pub struct HasOne(Resolved);

impl HasOne {
    /// Associate `source` with the single `target` row pointing back at it.
    pub fn new(source: &str, target: &str, options: AssociationOptions) -> Self {
        Self(Resolved::new(source, target, source, options))
    }

    /// The foreign-key column in the target table.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.0.identifier
    }
}

impl Association for HasOne {
    fn join_statement(&self, source_alias: &str, target_alias: &str) -> String {
        format!(
            "JOIN {} AS {target_alias} ON {target_alias}.{} = {source_alias}.{}",
            self.0.target, self.0.identifier, self.0.references
        )
    }

    fn foreign_key_column(&self) -> ForeignKeyColumn {
        ForeignKeyColumn {
            table: self.0.target.clone(),
            column: self.0.identifier.clone(),
            sql_type: FOREIGN_KEY_TYPE,
        }
    }

    fn accessor(&self) -> &str {
        &self.0.accessor
    }

    fn target_table(&self) -> &str {
        &self.0.target
    }
}
