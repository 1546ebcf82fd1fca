// src/exec/mod.rs

//! Job submission layer.
//!
//! The runtime hands READY jobs to a [`SubmissionBackend`]; the backend
//! reports status changes back to the runtime via `RuntimeEvent`s.
//!
//! - [`backend`] provides the `SubmissionBackend` trait and the
//!   `SimulatedBackend` used by `expflow simulate`.
//! - [`simulator`] owns the loop that plays a job's remote lifecycle.

pub mod backend;
pub mod simulator;

pub use backend::{SimulatedBackend, SubmissionBackend};
pub use simulator::spawn_simulator;
