// src/status/mod.rs

//! Run-time status state machine.

pub mod engine;
pub mod retry;
pub mod skip;

pub use engine::{CancelRequest, CycleReport, EngineOptions, StatusEngine, Transition};
pub use retry::{RetryDecision, plan_retry};
pub use skip::{SkipDecision, superseded_jobs};
