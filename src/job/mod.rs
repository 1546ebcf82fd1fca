// src/job/mod.rs

//! Job instances, their status and how sections expand into them.

pub mod expander;
pub mod instance;
pub mod selection;
pub mod status;

pub use expander::{instance_keys, ExpansionStats, JobInstanceExpander};
pub use instance::{Coordinates, EdgeInfo, Job, JobKey, JobName, StartDate};
pub use selection::{Selection, Selector};
pub use status::Status;
