//! Error types for the runway executor.
//!
//! The taxonomy mirrors the failure policy of the executor: command-level
//! failures, untolerated stage aborts, probe exhaustion, and cancellation.
//! Failures in the post-processing phases are never represented here because
//! they never escalate; they are logged warnings only.

use thiserror::Error;

/// The main error type for runway operations.
#[derive(Debug, Error)]
pub enum RunwayError {
    /// A pipeline validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A command could not be invoked at all.
    #[error("{0}")]
    Command(#[from] CommandError),

    /// An untolerated command failure halted the pipeline.
    #[error("{0}")]
    StageAbort(#[from] StageAbortError),

    /// The readiness probe never observed a healthy response.
    #[error("{0}")]
    Probe(#[from] ProbeError),

    /// The run was cancelled before completion.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error, if any.
    pub stages: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// Errors raised when an external command cannot be invoked.
///
/// A command that runs and exits non-zero is not a `CommandError`; its exit
/// code is captured in the run record and judged by the tolerance policy.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process could not be spawned (missing binary, permissions).
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The captured output could not be collected.
    #[error("Failed to capture output of '{program}': {source}")]
    Capture {
        /// The program whose output was lost.
        program: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// Returns the program name the error refers to.
    #[must_use]
    pub fn program(&self) -> &str {
        match self {
            Self::Spawn { program, .. } | Self::Capture { program, .. } => program,
        }
    }
}

/// Error raised when an untolerated command failure aborts the stage loop.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' aborted: '{command}' exited with code {exit_code}")]
pub struct StageAbortError {
    /// The stage that was executing when the failure occurred.
    pub stage: String,
    /// The command line that failed.
    pub command: String,
    /// The exit code of the failing command.
    pub exit_code: i32,
}

impl StageAbortError {
    /// Creates a new stage abort error.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        command: impl Into<String>,
        exit_code: i32,
    ) -> Self {
        Self {
            stage: stage.into(),
            command: command.into(),
            exit_code,
        }
    }
}

/// Errors raised by the readiness probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The endpoint never returned a 2xx response within the attempt budget.
    #[error(
        "Endpoint {url} not ready after {attempts} attempts (last status: {})",
        last_status.map_or_else(|| "no response".to_string(), |s| s.to_string())
    )]
    Unhealthy {
        /// The probed URL.
        url: String,
        /// How many attempts were made.
        attempts: usize,
        /// The last HTTP status observed, if any response arrived.
        last_status: Option<u16>,
    },

    /// The HTTP client could not be constructed.
    #[error("Probe client error: {0}")]
    Client(#[from] reqwest::Error),
}
