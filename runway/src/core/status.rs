//! Terminal status of a pipeline run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The terminal status of a pipeline invocation.
///
/// Exactly one status is produced per invocation: either every stage ran to
/// completion, or execution stopped at the recorded stage with the recorded
/// exit code. Tolerated failures never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// All stages ran to completion.
    Success,
    /// Execution stopped at `stage` when a command exited with `exit_code`.
    Failed {
        /// The stage that was executing when the run aborted.
        stage: String,
        /// The failing command's exit code.
        exit_code: i32,
    },
}

impl RunStatus {
    /// Returns true if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the run failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Maps the status to a process exit code.
    ///
    /// Success maps to 0; failure carries the failing command's exit code
    /// through, so a caller invoking the pipeline as a CLI surfaces it.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failed { exit_code, .. } => *exit_code,
        }
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Success
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed { stage, exit_code } => {
                write!(f, "FAILED in '{stage}' (exit {exit_code})")
            }
        }
    }
}
