//! Eager-load join plans.
//!
//! A [`JoinPlanNode`] tree says which tables to fetch in one query and under
//! which alias. [`compile`] walks it depth-first, children in declaration
//! order, and produces the `FROM` clause and the aliased projection. Every
//! projected column is named `<prefix>+<attribute>` so rows can be split back
//! per node.

use std::collections::HashSet;
use std::sync::Arc;

use tabula_types::{ALIAS_SEPARATOR, quote_identifier};

use crate::association::Association;
use crate::error::CompileError;

/// One table in an eager-load tree.
#[derive(Debug, Clone)]
pub struct JoinPlanNode {
    table: String,
    prefix: String,
    attributes: Vec<String>,
    children: Vec<JoinChild>,
}

/// A child node and the association that joins it to its parent.
#[derive(Debug, Clone)]
pub struct JoinChild {
    /// Association from the parent table to the child table.
    pub association: Arc<dyn Association>,
    /// The child node.
    pub node: JoinPlanNode,
}

impl JoinPlanNode {
    /// Create a node for `table` aliased as `prefix`.
    pub fn new(table: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            prefix: prefix.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Set the attributes this node projects.
    #[must_use]
    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Append a child joined through `association`.
    #[must_use]
    pub fn child(mut self, association: Arc<dyn Association>, node: JoinPlanNode) -> Self {
        self.children.push(JoinChild { association, node });
        self
    }

    /// Table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Alias prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Projected attributes in order.
    #[must_use]
    pub fn attribute_names(&self) -> &[String] {
        &self.attributes
    }

    /// Children in declaration order.
    #[must_use]
    pub fn children(&self) -> &[JoinChild] {
        &self.children
    }

    /// Find the node aliased `prefix` anywhere in the tree.
    #[must_use]
    pub fn find(&self, prefix: &str) -> Option<&JoinPlanNode> {
        if self.prefix == prefix {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.node.find(prefix))
    }

    /// Check that no prefix appears twice in the tree.
    pub fn validate(&self) -> Result<(), CompileError> {
        fn walk<'a>(node: &'a JoinPlanNode, seen: &mut HashSet<&'a str>) -> Result<(), CompileError> {
            if !seen.insert(node.prefix.as_str()) {
                return Err(CompileError::DuplicatePrefix(node.prefix.clone()));
            }
            node.children.iter().try_for_each(|c| walk(&c.node, seen))
        }
        walk(self, &mut HashSet::new())
    }
}

/// Compiled form of a join plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPlan {
    /// Root `table AS prefix` followed by one join statement per child.
    pub from: Vec<String>,
    /// One `` prefix.`attr` AS `prefix+attr` `` entry per attribute.
    pub projection: Vec<String>,
}

impl JoinPlan {
    /// The `FROM` source text.
    #[must_use]
    pub fn from_clause(&self) -> String {
        self.from.join(" ")
    }

    /// The select-list text.
    #[must_use]
    pub fn projection_list(&self) -> String {
        self.projection.join(", ")
    }
}

/// Compile a join-plan tree.
#[must_use]
pub fn compile(root: &JoinPlanNode) -> JoinPlan {
    let mut plan = JoinPlan {
        from: vec![format!("{} AS {}", root.table, root.prefix)],
        projection: Vec::new(),
    };
    visit(root, &mut plan);
    tracing::trace!(
        table = %root.table,
        joins = plan.from.len() - 1,
        columns = plan.projection.len(),
        "compiled join plan"
    );
    plan
}

fn visit(node: &JoinPlanNode, plan: &mut JoinPlan) {
    for attr in &node.attributes {
        let alias = format!("{}{ALIAS_SEPARATOR}{attr}", node.prefix);
        plan.projection.push(format!(
            "{}.{} AS {}",
            node.prefix,
            quote_identifier(attr),
            quote_identifier(&alias)
        ));
    }
    for child in &node.children {
        plan.from
            .push(child.association.join_statement(&node.prefix, &child.node.prefix));
        visit(&child.node, plan);
    }
}
