//! # tabula-sql
//!
//! MySQL statement compiler and eager-load join-plan compiler.
//!
//! Everything here is pure and synchronous: structured descriptions go in,
//! SQL text comes out. Errors are reported before any connection is touched.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tabula_sql::{AssociationOptions, Filter, FilterValue, HasOne, JoinPlanNode, SelectOptions};
//!
//! let filter = Filter::map([("id", FilterValue::list([1, 2, 3]))]);
//! assert_eq!(tabula_sql::where_clause(&filter).unwrap(), "`id` IN (1,2,3)");
//!
//! let plan = JoinPlanNode::new("users", "u")
//!     .attributes(["id", "name"])
//!     .child(
//!         Arc::new(HasOne::new("users", "profiles", AssociationOptions::new())),
//!         JoinPlanNode::new("profiles", "p").attributes(["bio"]),
//!     );
//! let sql = tabula_sql::select("users", &SelectOptions::new().fill_plan(&plan)).unwrap();
//! assert!(sql.starts_with("SELECT u.`id` AS `u+id`"));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod association;
pub mod error;
pub mod filter;
pub mod inflection;
pub mod join_plan;
pub mod statement;

pub use association::{Accessors, Association, AssociationOptions, BelongsTo, ForeignKeyColumn, HasOne};
pub use error::CompileError;
pub use filter::{Filter, FilterValue, where_clause};
pub use join_plan::{JoinChild, JoinPlan, JoinPlanNode, compile};
pub use statement::{SelectOptions, count, create_table, delete, drop_table, insert, select, update};
