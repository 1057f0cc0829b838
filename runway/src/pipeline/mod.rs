//! Pipeline definition and execution.
//!
//! This module provides:
//! - Stage and pipeline specifications
//! - A fluent pipeline builder with validation
//! - The sequential executor with typed failure policy

mod builder;
mod executor;
mod spec;

pub use builder::PipelineBuilder;
pub use executor::Executor;
pub use spec::{PipelineSpec, PostActions, Stage};
