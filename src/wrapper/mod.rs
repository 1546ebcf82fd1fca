// src/wrapper/mod.rs

//! Submission order of jobs packed into wrappers.

pub mod order;

pub use order::{WrapperGroup, WrapperOrderer, WrapperRun};
