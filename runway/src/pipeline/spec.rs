//! Stage and pipeline specifications.

use crate::command::Command;
use crate::errors::PipelineValidationError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A named, ordered group of commands.
///
/// Identity is the stage's position in the pipeline's stage list; names are
/// for diagnostics and should be unique, but this is not enforced. An empty
/// command list is a legal no-op stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// The stage name.
    pub name: String,
    /// Commands executed strictly in order.
    #[serde(default)]
    pub commands: Vec<Command>,
    /// Fixed delay before the first command runs, in milliseconds.
    ///
    /// Fallback for collaborators with no readiness signal of their own;
    /// prefer a readiness probe where a health endpoint exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_delay_ms: Option<u64>,
}

impl Stage {
    /// Creates a new stage with no commands.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
            startup_delay_ms: None,
        }
    }

    /// Appends a command.
    #[must_use]
    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Appends several commands.
    #[must_use]
    pub fn commands(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.commands.extend(commands);
        self
    }

    /// Sets a fixed delay before the stage's first command.
    #[must_use]
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.startup_delay_ms = Some(delay_ms);
        self
    }
}

/// Post-processing phases executed after the stage loop.
///
/// `always` runs unconditionally exactly once per invocation; `on_failure`
/// runs only when the run failed. Both phases are best-effort: their own
/// failures are logged and never escalate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostActions {
    /// Commands run unconditionally after the stage loop.
    #[serde(default)]
    pub always: Vec<Command>,
    /// Commands run only when the run failed.
    #[serde(default)]
    pub on_failure: Vec<Command>,
}

impl PostActions {
    /// Creates empty post actions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an always-phase command.
    #[must_use]
    pub fn always(mut self, command: Command) -> Self {
        self.always.push(command);
        self
    }

    /// Appends an on-failure command.
    #[must_use]
    pub fn on_failure(mut self, command: Command) -> Self {
        self.on_failure.push(command);
        self
    }
}

/// Specification for an entire pipeline run.
///
/// Immutable during a run. The working directory is an explicit value
/// threaded through the executor, never ambient process state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// The pipeline name.
    pub name: String,
    /// Stages executed strictly in list order.
    pub stages: Vec<Stage>,
    /// Post-processing phases.
    #[serde(default)]
    pub post: PostActions,
    /// Default working directory for every command (the build context).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
}

impl PipelineSpec {
    /// Creates a new pipeline specification with no stages.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            post: PostActions::default(),
            workdir: None,
        }
    }

    /// Validates the specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the stage list is empty.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Pipeline name cannot be empty or whitespace-only",
            ));
        }
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new(
                "Pipeline must contain at least one stage",
            ));
        }
        Ok(())
    }

    /// Parses a specification from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON or a spec that fails validation.
    pub fn from_json(json: &str) -> Result<Self, crate::errors::RunwayError> {
        let spec: Self = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Serializes the specification to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
