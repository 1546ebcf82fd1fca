// src/dag/mod.rs

//! Workflow graph and its maintenance.
//!
//! - [`graph`] holds the DAG of job instances and keeps each job's
//!   genealogy in sync with it.
//! - [`reduction`] finds the edges a transitive reduction removes.
//! - [`builder`] runs full and incremental builds.

pub mod builder;
pub mod graph;
mod reduction;

pub use builder::{BuildOutcome, build_graph, rebuild_graph, rebuild_with_diff};
pub use graph::WorkflowGraph;
