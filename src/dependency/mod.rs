// src/dependency/mod.rs

//! The dependency expression language and its resolution into edges.
//!
//! - [`model`] holds the parsed forms (keys, filter expressions, relation
//!   trees).
//! - [`parser`] parses the compact key syntax and filter expressions.
//! - [`filter`] evaluates a relation tree for one job instance.
//! - [`resolver`] wires graph edges from the parsed dependencies.

pub mod filter;
pub mod model;
pub mod parser;
pub mod resolver;

pub use filter::{AxisFilter, AxisFilterResult, AxisValues, filter_current_job};
pub use model::{Dependency, DependencyKey, FilterExpr, FilterItem, FromClause, RelationNode, Sign};
pub use parser::{DependencyParseError, parse_dependency_key, parse_filter_expr, parse_relation_tree};
pub use resolver::{DependencyResolver, WireStats, dependents_closure, split_block};
