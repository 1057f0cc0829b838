//! # Runway
//!
//! A sequential deployment-pipeline executor with typed failure policy and
//! compensating cleanup.
//!
//! Runway runs an ordered list of named stages, each an ordered list of
//! external-process commands, with:
//!
//! - **Typed failure tolerance**: per-command `tolerate_failure` replaces
//!   the shell `|| true` idiom; the first untolerated failure aborts all
//!   remaining stages
//! - **Guaranteed post-processing**: an `always` phase runs exactly once
//!   per invocation, with an `on_failure` branch that surfaces collaborator
//!   logs and tears resources down
//! - **Readiness probing**: bounded HTTP polling with backoff instead of
//!   blind startup sleeps
//! - **Cooperative cancellation**: honored between commands, never
//!   interrupting a child process in flight
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use runway::prelude::*;
//! use std::sync::Arc;
//!
//! let spec = PipelineBuilder::new("deploy")
//!     .stage_command("cleanup", Command::new("docker-compose").arg("down").tolerated())
//!     .stage_command("build", Command::new("docker").args(["build", "-t", "app", "."]))
//!     .always(Command::new("echo").arg("Pipeline completed"))
//!     .on_failure(Command::new("docker-compose").arg("logs"))
//!     .build()?;
//!
//! let executor = Executor::new(Arc::new(ProcessRunner::new()));
//! let result = executor.run(&spec).await;
//! std::process::exit(result.exit_code());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod command;
pub mod core;
pub mod deploy;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod probe;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, CleanupGuard};
    pub use crate::command::{
        Command, CommandOutput, CommandRunner, ProcessRunner, ScriptedRunner,
    };
    pub use crate::core::{CommandRecord, RunResult, RunStatus};
    pub use crate::deploy::{deploy_pipeline, run_deploy, DeployConfig};
    pub use crate::errors::{
        CommandError, PipelineValidationError, ProbeError, RunwayError, StageAbortError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{Executor, PipelineBuilder, PipelineSpec, PostActions, Stage};
    pub use crate::probe::{BackoffStrategy, ProbeConfig, ReadinessProbe};
}
